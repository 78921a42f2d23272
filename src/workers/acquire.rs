//! Acquisition worker (sensor variant).
//!
//! Once per cycle: acquire the bus guard with a short timeout, perform the
//! sensor transaction, release the guard, validate the readings against a
//! plausibility range, and enqueue the resulting sample — but only while
//! the link is up, so the queue does not churn while disconnected.
//!
//! A guard timeout is treated exactly like a failed hardware read: the
//! cycle's sample is marked invalid with quality 0, the error counter
//! increments, and the worker waits for the next scheduled cycle. No retry
//! happens within a cycle.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::bus::BusGuard;
use crate::channel::{SendOutcome, TelemetryChannel};
use crate::config::NodeConfig;
use crate::conn::ConnectionState;
use crate::error::SensorError;
use crate::ports::{RawReading, SensorBus, SystemPort};
use crate::telemetry::TelemetrySample;

/// One-time sensor initialisation gets a more generous guard budget than
/// the periodic cycle.
const INIT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);

/// Physically plausible reading ranges; anything outside marks the cycle
/// invalid.
const TEMPERATURE_RANGE_C: core::ops::RangeInclusive<f32> = -40.0..=85.0;
const HUMIDITY_RANGE_PCT: core::ops::RangeInclusive<f32> = 0.0..=100.0;

/// Counters maintained by the acquisition worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireStats {
    /// Successful reads.
    pub reads: u32,
    /// Failed cycles (guard timeout, bus error, implausible data).
    pub errors: u32,
    /// Telemetry sends that evicted the oldest queued sample.
    pub evictions: u32,
}

/// The acquisition worker.
pub struct AcquisitionWorker<Bus: SensorBus, S: SystemPort> {
    guard: Arc<BusGuard<Bus>>,
    system: S,
    conn: Arc<ConnectionState>,
    telemetry: Arc<TelemetryChannel>,
    acquire_timeout: Duration,
    cycle_interval: Duration,
    stats: AcquireStats,
}

impl<Bus: SensorBus, S: SystemPort> AcquisitionWorker<Bus, S> {
    pub fn new(
        guard: Arc<BusGuard<Bus>>,
        system: S,
        conn: Arc<ConnectionState>,
        telemetry: Arc<TelemetryChannel>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            guard,
            system,
            conn,
            telemetry,
            acquire_timeout: Duration::from_millis(u64::from(config.bus_acquire_timeout_ms)),
            cycle_interval: Duration::from_millis(u64::from(config.sensor_read_interval_ms)),
            stats: AcquireStats::default(),
        }
    }

    /// One-time sensor wake-up. Init failure is logged and left to the
    /// per-cycle error handling; the loop must start regardless.
    pub fn init_sensor(&mut self) {
        match self.guard.acquire(INIT_ACQUIRE_TIMEOUT) {
            Some(mut bus) => match bus.init() {
                Ok(()) => info!("Acquire: sensor initialised"),
                Err(e) => warn!("Acquire: sensor init failed: {e}"),
            },
            None => warn!("Acquire: bus busy during init"),
        }
    }

    /// Run forever at the acquisition cadence.
    pub fn run(mut self) -> ! {
        self.init_sensor();
        info!("Acquire: reading every {:?}", self.cycle_interval);
        loop {
            self.cycle();
            thread::sleep(self.cycle_interval);
        }
    }

    /// One acquisition cycle.
    pub fn cycle(&mut self) {
        // Guard held only for the transaction itself; released before the
        // sample is constructed or enqueued.
        let raw = match self.guard.acquire(self.acquire_timeout) {
            Some(mut bus) => bus.read_sample(),
            None => Err(SensorError::BusBusy),
        };

        let uptime_ms = self.system.uptime_ms();
        let uptime_s = (uptime_ms / 1000) as u32;
        let heap = self.system.free_heap_bytes();

        let sample = match raw {
            Ok(reading) if plausible(reading) => {
                self.stats.reads += 1;
                info!(
                    "Acquire: {:.1} degC  {:.1} %RH",
                    reading.temperature_c, reading.humidity_pct
                );
                TelemetrySample::valid(
                    reading.temperature_c,
                    reading.humidity_pct,
                    uptime_s,
                    heap,
                    uptime_ms,
                )
            }
            Ok(reading) => {
                self.stats.errors += 1;
                warn!(
                    "Acquire: implausible reading ({:.1} degC, {:.1} %RH)",
                    reading.temperature_c, reading.humidity_pct
                );
                TelemetrySample::invalid(uptime_s, heap, uptime_ms)
            }
            Err(e) => {
                self.stats.errors += 1;
                warn!("Acquire: cycle failed: {e}");
                TelemetrySample::invalid(uptime_s, heap, uptime_ms)
            }
        };

        // Enqueue only while the link is up.
        if !self.conn.link_up() {
            return;
        }
        if let Ok(SendOutcome::DeliveredEvictedOldest) = self.telemetry.send(sample) {
            self.stats.evictions += 1;
            warn!("Acquire: telemetry queue full, dropped oldest sample");
        }
    }

    pub fn stats(&self) -> AcquireStats {
        self.stats
    }
}

fn plausible(r: RawReading) -> bool {
    r.temperature_c.is_finite()
        && r.humidity_pct.is_finite()
        && TEMPERATURE_RANGE_C.contains(&r.temperature_c)
        && HUMIDITY_RANGE_PCT.contains(&r.humidity_pct)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
