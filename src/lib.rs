//! Nodelink firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod bus;
pub mod channel;
pub mod command;
pub mod config;
pub mod conn;
pub mod net;
pub mod ports;
pub mod telemetry;
pub mod wire;
pub mod workers;

mod error;

pub use error::{ActuatorError, CommsError, Error, Result, SensorError, StoreError};

// Adapters compile on every target; the ESP-IDF implementations inside are
// cfg-guarded and replaced by simulation backends on the host.
pub mod adapters;
