//! Inbound commands and control actions.
//!
//! The broker delivers JSON payloads; the wire boundary (`crate::wire`)
//! decodes them into these tagged values before anything touches the
//! command channel. Unparseable input is a decode failure and never becomes
//! a `Command`; well-formed JSON with an unrecognised `type` tag becomes
//! [`Command::Unknown`], which the actuation worker counts and ignores.

use serde::Deserialize;

/// RGB colour triple for the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Self = Self { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A command consumed exactly once by the actuation worker.
///
/// Wire shapes (field names follow the deployed server):
/// `{"type":"gpio","pin":1,"state":true}` (alias `relay`) and
/// `{"type":"neopixel","color":{"r":0,"g":128,"b":255}}` (alias `led`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Switch one output channel. `pin` is 1-based; range checking happens
    /// in the actuation worker, not here.
    #[serde(alias = "relay")]
    Gpio { pin: u8, state: bool },

    /// Override the status indicator colour.
    #[serde(alias = "led")]
    Neopixel { color: Rgb },

    /// Well-formed payload with an unrecognised type tag.
    #[serde(other)]
    Unknown,
}

/// Control verbs from the `cmd` topic. Handled inline by the network
/// worker; never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Restart the node.
    Reboot,
    /// Publish a diagnostics report.
    RunDiagnostics,
}
