//! Scripted ports shared by the integration tests.
//!
//! The simulation backends in `nodelink::adapters` cover the link, broker,
//! outputs and indicator; these add a scriptable sensor bus and a fixed
//! clock for deterministic samples.

use std::collections::VecDeque;

use nodelink::ports::{RawReading, SensorBus, SystemPort};
use nodelink::SensorError;

/// Sensor bus that replays a scripted sequence of results, then repeats
/// the last one.
pub struct ScriptedSensorBus {
    script: VecDeque<Result<RawReading, SensorError>>,
    last: Result<RawReading, SensorError>,
}

impl ScriptedSensorBus {
    pub fn new(script: Vec<Result<RawReading, SensorError>>) -> Self {
        let last = script
            .last()
            .copied()
            .unwrap_or(Err(SensorError::BusReadFailed));
        Self {
            script: script.into(),
            last,
        }
    }

    pub fn steady(temperature_c: f32, humidity_pct: f32) -> Self {
        Self::new(vec![Ok(RawReading {
            temperature_c,
            humidity_pct,
        })])
    }
}

impl SensorBus for ScriptedSensorBus {
    fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read_sample(&mut self) -> Result<RawReading, SensorError> {
        match self.script.pop_front() {
            Some(result) => result,
            None => self.last,
        }
    }
}

/// Deterministic clock/heap source.
pub struct FixedSystem {
    pub uptime_ms: u64,
}

impl SystemPort for FixedSystem {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms
    }

    fn free_heap_bytes(&self) -> u32 {
        200_000
    }

    fn restart(&mut self) {}
}

/// Node config tuned so the association window takes milliseconds.
pub fn fast_config(identity: bool, broker: bool) -> nodelink::config::NodeConfig {
    let mut c = nodelink::config::NodeConfig {
        link_attempt_iters: 4,
        link_poll_interval_ms: 10,
        ..nodelink::config::NodeConfig::default()
    };
    if identity {
        c.wifi_ssid.push_str("HomeNet").unwrap();
        c.wifi_password.push_str("secret123").unwrap();
    }
    if broker {
        c.mqtt_host.push_str("broker.local").unwrap();
        c.pairing_token.push_str("482913").unwrap();
    }
    c
}
