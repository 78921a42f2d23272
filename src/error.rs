//! Unified error types for the Nodelink firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! worker loops' error handling uniform. All variants are `Copy` so they can
//! be passed through counters and logs without allocation. No error kind is
//! ever allowed to terminate a worker loop; each handled case falls through
//! to the next scheduled cycle.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The sensor bus could not be read or returned implausible data.
    Sensor(SensorError),
    /// An output or indicator write failed.
    Actuator(ActuatorError),
    /// A connectivity subsystem (link or broker) failed.
    Comms(CommsError),
    /// The persistent config store failed.
    Store(StoreError),
    /// Peripheral or primitive initialisation failed at bootstrap.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The bus transaction failed or the device did not respond.
    BusReadFailed,
    /// Exclusive bus access could not be obtained within the timeout.
    BusBusy,
    /// Reading is outside the physically plausible range (or NaN).
    OutOfRange,
    /// Measurement checksum did not match.
    CrcMismatch,
    /// The sensor has not completed initialisation.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusReadFailed => write!(f, "bus read failed"),
            Self::BusBusy => write!(f, "bus busy (guard timeout)"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::NotReady => write!(f, "sensor not ready"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Output channel index is outside the installed bank.
    InvalidChannel,
    /// GPIO write failed.
    GpioWriteFailed,
    /// Indicator write failed.
    IndicatorWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannel => write!(f, "invalid output channel"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::IndicatorWriteFailed => write!(f, "indicator write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// Network scan could not be performed (non-fatal, diagnostic only).
    ScanFailed,
    /// Station association did not complete within the attempt window.
    LinkConnectFailed,
    /// The link dropped while connected.
    LinkDown,
    /// Access point could not be started.
    AccessPointFailed,
    /// Broker refused the connection or the attempt timed out.
    BrokerConnectFailed,
    /// Topic subscription failed.
    SubscribeFailed,
    /// Message publish failed.
    PublishFailed,
    /// Inbound payload could not be decoded.
    MalformedPayload,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed => write!(f, "network scan failed"),
            Self::LinkConnectFailed => write!(f, "link connect failed"),
            Self::LinkDown => write!(f, "link down"),
            Self::AccessPointFailed => write!(f, "access point start failed"),
            Self::BrokerConnectFailed => write!(f, "broker connect failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::MalformedPayload => write!(f, "malformed payload"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Config store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// No stored value exists (first boot).
    NotFound,
    /// Stored blob failed deserialization.
    Corrupted,
    /// A config field failed range validation before persistence.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Corrupted => write!(f, "stored config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
