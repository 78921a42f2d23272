//! Port traits — the boundary between the orchestration core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Worker (core)
//! ```
//!
//! Adapters (WiFi driver, MQTT client, NVS, GPIO, sensors) implement these
//! traits; the workers consume them via generics, so the core never touches
//! hardware or the radio stack directly and every worker is testable with
//! mock ports.

use crate::command::Rgb;
use crate::config::NodeConfig;
use crate::error::{ActuatorError, CommsError, SensorError, StoreError};

// ───────────────────────────────────────────────────────────────
// Config store (bootstrap ↔ persistent storage)
// ───────────────────────────────────────────────────────────────

/// Persistent node configuration. Loaded once at bootstrap to pick the
/// initial connection phase; `clear()` only on explicit factory reset.
pub trait ConfigStore {
    /// Load the stored configuration, or defaults if none exists.
    fn load(&self) -> Result<NodeConfig, StoreError>;

    /// Validate and persist the configuration (last write wins).
    fn save(&mut self, config: &NodeConfig) -> Result<(), StoreError>;

    /// Erase the stored configuration.
    fn clear(&mut self) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Link (transport) driver
// ───────────────────────────────────────────────────────────────

/// Association progress as reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No association in progress.
    Idle,
    /// Association attempt running.
    Connecting,
    /// Station associated with an IP.
    Connected,
    /// The last attempt failed.
    Failed,
}

/// One network found during a diagnostic scan.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub ssid: heapless::String<32>,
    pub rssi: i8,
}

/// Station/access-point lifecycle of the local wireless link.
/// Polled by the network worker during `LinkConnecting`.
pub trait LinkPort {
    /// Diagnostic scan. Failure is non-fatal; absence of the target from
    /// the result never blocks the connection attempt.
    fn scan(&mut self) -> Result<heapless::Vec<ScanRecord, 16>, CommsError>;

    /// Begin a station-mode association attempt (non-blocking; poll
    /// [`status`](Self::status) for the outcome).
    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), CommsError>;

    /// Current association status.
    fn status(&self) -> LinkStatus;

    /// Tear down any station state and host a local access point (with
    /// captive name-resolution redirection to the configuration interface).
    fn begin_access_point(&mut self, ssid: &str, password: &str) -> Result<(), CommsError>;

    /// Signal strength of the associated AP, when connected.
    fn rssi(&self) -> Option<i8>;

    /// Convenience liveness check.
    fn is_connected(&self) -> bool {
        self.status() == LinkStatus::Connected
    }
}

// ───────────────────────────────────────────────────────────────
// Broker (messaging) driver
// ───────────────────────────────────────────────────────────────

/// An inbound message delivered by the broker driver. The driver only
/// queues `(topic, payload)`; translation into a [`Command`](crate::command::Command)
/// or control action happens at the wire boundary on the network worker.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: heapless::String<128>,
    pub payload: heapless::Vec<u8, 512>,
}

/// Broker session lifecycle and messaging.
pub trait BrokerPort {
    /// Single blocking connection attempt. Returns `true` on success.
    fn connect(&mut self, client_id: &str) -> bool;

    /// Subscribe to a topic on the current session.
    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError>;

    /// Publish a payload, optionally retained.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError>;

    /// Service keep-alives and move received messages into the inbound
    /// queue. Called once per network worker tick.
    fn poll(&mut self);

    /// Session liveness.
    fn is_connected(&self) -> bool;

    /// Take the next queued inbound message, if any.
    fn take_inbound(&mut self) -> Option<InboundMessage>;
}

// ───────────────────────────────────────────────────────────────
// Sensor bus
// ───────────────────────────────────────────────────────────────

/// Raw readings copied out of one bus transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// The shared temperature/humidity sensor behind the bus guard.
pub trait SensorBus {
    /// One-time device initialisation (wake-up/calibration check).
    fn init(&mut self) -> Result<(), SensorError>;

    /// Perform one measurement transaction.
    fn read_sample(&mut self) -> Result<RawReading, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Outputs and indicator
// ───────────────────────────────────────────────────────────────

/// Number of switchable output channels on the actuator variant.
pub const OUTPUT_CHANNELS: usize = 8;

/// Bank of switchable outputs (relays/GPIO), 0-based physical index.
pub trait OutputBank {
    /// Drive all channels to their safe (off) state.
    fn all_off(&mut self);

    /// Set one channel. `index` is 0-based and already range-checked by
    /// the caller.
    fn set_channel(&mut self, index: usize, on: bool) -> Result<(), ActuatorError>;

    /// Last commanded state of each channel.
    fn states(&self) -> [bool; OUTPUT_CHANNELS];
}

/// RGB status indicator. Takes `&self` so the indicator worker and the
/// actuation worker can share one instance; implementations synchronise
/// internally.
pub trait IndicatorPort {
    fn set_rgb(&self, rgb: Rgb);
}

impl<T: IndicatorPort + ?Sized> IndicatorPort for std::sync::Arc<T> {
    fn set_rgb(&self, rgb: Rgb) {
        (**self).set_rgb(rgb);
    }
}

// ───────────────────────────────────────────────────────────────
// System services
// ───────────────────────────────────────────────────────────────

/// Monotonic clock, heap statistics, and the hard-restart escape hatch.
pub trait SystemPort {
    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;

    /// Free heap in bytes.
    fn free_heap_bytes(&self) -> u32;

    /// Hard restart. On the device this does not return; simulation
    /// backends record the request instead.
    fn restart(&mut self);
}
