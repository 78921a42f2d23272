//! Telemetry samples.
//!
//! One sample is produced per acquisition cycle and consumed (copied out)
//! by the network worker. Samples are immutable after construction; the
//! constructors enforce the quality/validity coupling, so `quality == 0`
//! always accompanies `valid == false`.

use serde::Serialize;

/// Sentinel reading reported when a cycle failed.
pub const INVALID_READING: f32 = -1.0;

/// A point-in-time sensor reading plus system health captured at
/// acquisition time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Temperature in Celsius, or [`INVALID_READING`].
    pub temperature_c: f32,
    /// Relative humidity in percent, or [`INVALID_READING`].
    pub humidity_pct: f32,
    /// True if the readings are trustworthy.
    pub valid: bool,
    /// Data quality score: 0 (bad) to 100 (perfect).
    pub quality: u8,
    /// Uptime in seconds at capture.
    pub uptime_s: u32,
    /// Free heap in bytes at capture.
    pub free_heap: u32,
    /// Monotonic capture timestamp in milliseconds.
    pub captured_ms: u64,
}

impl TelemetrySample {
    /// A trustworthy reading (quality 100).
    pub fn valid(
        temperature_c: f32,
        humidity_pct: f32,
        uptime_s: u32,
        free_heap: u32,
        captured_ms: u64,
    ) -> Self {
        Self {
            temperature_c,
            humidity_pct,
            valid: true,
            quality: 100,
            uptime_s,
            free_heap,
            captured_ms,
        }
    }

    /// A failed cycle: sentinel readings, quality 0.
    pub fn invalid(uptime_s: u32, free_heap: u32, captured_ms: u64) -> Self {
        Self {
            temperature_c: INVALID_READING,
            humidity_pct: INVALID_READING,
            valid: false,
            quality: 0,
            uptime_s,
            free_heap,
            captured_ms,
        }
    }
}
