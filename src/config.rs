//! Node configuration.
//!
//! All tunable parameters for a Nodelink node: network identity, broker
//! address, role selection, and worker timing. Values are persisted to NVS
//! as a single blob and can be rewritten via the configuration portal.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Which side of the system this node runs: periodic acquisition of sensor
/// telemetry, or application of queued commands to outputs. One firmware
/// image serves both; the bootstrap spawns the matching worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Sensor,
    Actuator,
}

/// Core node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Acquisition or actuation variant.
    pub role: NodeRole,

    // --- Network identity ---
    /// Stored station SSID. Empty means "no managed link" and the node
    /// boots straight into configuration mode.
    pub wifi_ssid: heapless::String<32>,
    /// Station passphrase (may be empty for open networks).
    pub wifi_password: heapless::String<64>,

    // --- Broker ---
    /// Broker hostname or address. Empty means "no broker configured";
    /// the node then idles with the link up and never attempts a broker
    /// connection.
    pub mqtt_host: heapless::String<64>,
    /// Broker TCP port.
    pub mqtt_port: u16,
    /// Token published on broker connect for server-side pairing.
    pub pairing_token: heapless::String<16>,

    // --- Link attempt window ---
    /// Maximum status polls during one association attempt.
    pub link_attempt_iters: u32,
    /// Delay between association status polls (milliseconds).
    pub link_poll_interval_ms: u32,

    // --- Worker cadence ---
    /// Network worker supervisory tick (milliseconds).
    pub net_tick_interval_ms: u32,
    /// Acquisition cycle interval (milliseconds).
    pub sensor_read_interval_ms: u32,
    /// Indicator refresh interval (milliseconds).
    pub indicator_interval_ms: u32,
    /// Retained status republish cadence (seconds).
    pub status_interval_secs: u32,

    // --- Bounded waits ---
    /// Bus guard acquisition timeout for one acquisition cycle (milliseconds).
    pub bus_acquire_timeout_ms: u32,
    /// Producer-side timeout for command channel sends (milliseconds).
    pub command_send_timeout_ms: u32,
    /// Consumer-side timeout for command channel receives (milliseconds).
    pub command_recv_timeout_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Sensor,

            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),

            mqtt_host: heapless::String::new(),
            mqtt_port: 1883,
            pairing_token: heapless::String::new(),

            // 40 polls x 500 ms ~= 20 s association window
            link_attempt_iters: 40,
            link_poll_interval_ms: 500,

            net_tick_interval_ms: 100,
            sensor_read_interval_ms: 1000,
            indicator_interval_ms: 500,
            status_interval_secs: 10,

            bus_acquire_timeout_ms: 200,
            command_send_timeout_ms: 100,
            command_recv_timeout_ms: 100,
        }
    }
}

impl NodeConfig {
    /// True if a stored network identity exists. Decides the boot phase:
    /// absent identity boots into configuration mode.
    pub fn has_identity(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }

    /// True if a broker address is configured.
    pub fn has_broker(&self) -> bool {
        !self.mqtt_host.is_empty()
    }

    /// Range-check all fields. Invalid values are rejected before
    /// persistence, never silently clamped.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.mqtt_port == 0 {
            return Err(StoreError::ValidationFailed("mqtt_port must be non-zero"));
        }
        if self.link_attempt_iters == 0 || self.link_attempt_iters > 600 {
            return Err(StoreError::ValidationFailed(
                "link_attempt_iters must be 1–600",
            ));
        }
        if !(10..=5000).contains(&self.link_poll_interval_ms) {
            return Err(StoreError::ValidationFailed(
                "link_poll_interval_ms must be 10–5000",
            ));
        }
        if !(10..=5000).contains(&self.net_tick_interval_ms) {
            return Err(StoreError::ValidationFailed(
                "net_tick_interval_ms must be 10–5000",
            ));
        }
        if !(100..=60_000).contains(&self.sensor_read_interval_ms) {
            return Err(StoreError::ValidationFailed(
                "sensor_read_interval_ms must be 100–60000",
            ));
        }
        if !(50..=5000).contains(&self.indicator_interval_ms) {
            return Err(StoreError::ValidationFailed(
                "indicator_interval_ms must be 50–5000",
            ));
        }
        if !(1..=3600).contains(&self.status_interval_secs) {
            return Err(StoreError::ValidationFailed(
                "status_interval_secs must be 1–3600",
            ));
        }
        if !(10..=5000).contains(&self.bus_acquire_timeout_ms) {
            return Err(StoreError::ValidationFailed(
                "bus_acquire_timeout_ms must be 10–5000",
            ));
        }
        if !(10..=5000).contains(&self.command_send_timeout_ms) {
            return Err(StoreError::ValidationFailed(
                "command_send_timeout_ms must be 10–5000",
            ));
        }
        if !(10..=5000).contains(&self.command_recv_timeout_ms) {
            return Err(StoreError::ValidationFailed(
                "command_recv_timeout_ms must be 10–5000",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = NodeConfig::default();
        assert!(!c.has_identity());
        assert!(!c.has_broker());
        assert_eq!(c.mqtt_port, 1883);
        assert_eq!(c.link_attempt_iters, 40);
        assert_eq!(c.link_poll_interval_ms, 500);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn attempt_window_is_roughly_twenty_seconds() {
        let c = NodeConfig::default();
        let window_ms = c.link_attempt_iters * c.link_poll_interval_ms;
        assert_eq!(window_ms, 20_000);
    }

    #[test]
    fn identity_detection() {
        let mut c = NodeConfig::default();
        c.wifi_ssid.push_str("HomeNet").unwrap();
        assert!(c.has_identity());
    }

    #[test]
    fn rejects_zero_port() {
        let c = NodeConfig {
            mqtt_port: 0,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(StoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_tick() {
        let c = NodeConfig {
            net_tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let mut c = NodeConfig::default();
        c.wifi_ssid.push_str("Net").unwrap();
        c.mqtt_host.push_str("broker.local").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let c2: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.wifi_ssid, c2.wifi_ssid);
        assert_eq!(c.mqtt_host, c2.mqtt_host);
        assert_eq!(c.mqtt_port, c2.mqtt_port);
    }

    #[test]
    fn postcard_roundtrip() {
        let mut c = NodeConfig::default();
        c.role = NodeRole::Actuator;
        c.wifi_ssid.push_str("Net").unwrap();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: NodeConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c2.role, NodeRole::Actuator);
        assert_eq!(c.wifi_ssid, c2.wifi_ssid);
    }
}
