//! Wire boundary: topics and JSON payloads.
//!
//! Everything that knows about field names and topic layout lives here.
//! The workers produce and consume tagged values ([`Command`],
//! [`TelemetrySample`]); this module turns them into broker payloads and
//! back. Topic layout follows the deployed server:
//!
//! ```text
//! devices/<id>/telemetry   node → server   sensor readings
//! devices/<id>/status      node → server   retained online status
//! devices/<id>/pair        node → server   pairing token
//! devices/<id>/diag        node → server   diagnostics report
//! devices/<id>/gpio/set    server → node   output commands
//! devices/<id>/cmd         server → node   control verbs
//! ```

use core::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::command::{Command, ControlAction};
use crate::conn::ConnectionSnapshot;
use crate::error::CommsError;
use crate::telemetry::TelemetrySample;

/// A fully-formed topic string.
pub type Topic = heapless::String<128>;

/// A decoded inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Goes onto the command channel for the actuation worker.
    Queue(Command),
    /// Handled inline by the network worker.
    Control(ControlAction),
}

// ───────────────────────────────────────────────────────────────
// Topics
// ───────────────────────────────────────────────────────────────

fn topic(device_id: &str, suffix: &str) -> Topic {
    let mut t = Topic::new();
    // Silently truncating a topic would misroute messages; device ids and
    // suffixes are short, so this cannot overflow 128 bytes.
    let _ = write!(t, "devices/{device_id}/{suffix}");
    t
}

pub fn telemetry_topic(device_id: &str) -> Topic {
    topic(device_id, "telemetry")
}

pub fn status_topic(device_id: &str) -> Topic {
    topic(device_id, "status")
}

pub fn pairing_topic(device_id: &str) -> Topic {
    topic(device_id, "pair")
}

pub fn diagnostics_topic(device_id: &str) -> Topic {
    topic(device_id, "diag")
}

pub fn gpio_topic(device_id: &str) -> Topic {
    topic(device_id, "gpio/set")
}

pub fn cmd_topic(device_id: &str) -> Topic {
    topic(device_id, "cmd")
}

// ───────────────────────────────────────────────────────────────
// Outbound encoding
// ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TelemetryWire {
    #[serde(rename = "tC")]
    temperature_c: f32,
    #[serde(rename = "rh")]
    humidity_pct: f32,
    heap: u32,
    uptime: u32,
    quality: u8,
    valid: bool,
    ts: u64,
}

/// Encode one telemetry sample (not retained — high-frequency data).
pub fn encode_telemetry(sample: &TelemetrySample) -> Vec<u8> {
    let wire = TelemetryWire {
        temperature_c: sample.temperature_c,
        humidity_pct: sample.humidity_pct,
        heap: sample.free_heap,
        uptime: sample.uptime_s,
        quality: sample.quality,
        valid: sample.valid,
        ts: sample.captured_ms,
    };
    serde_json::to_vec(&wire).unwrap_or_default()
}

#[derive(Serialize)]
struct StatusWire {
    online: bool,
    rssi: Option<i8>,
    #[serde(rename = "wifiMode")]
    wifi_mode: &'static str,
    ts: u64,
}

/// Encode the retained online-status message.
pub fn encode_status(snapshot: ConnectionSnapshot, rssi: Option<i8>, uptime_ms: u64) -> Vec<u8> {
    let wire = StatusWire {
        online: true,
        rssi,
        wifi_mode: if snapshot.configuration_mode { "AP" } else { "STA" },
        ts: uptime_ms,
    };
    serde_json::to_vec(&wire).unwrap_or_default()
}

#[derive(Serialize)]
struct PairingWire<'a> {
    token: &'a str,
    ts: u64,
}

/// Encode the pairing-token message sent once per broker session.
pub fn encode_pairing(token: &str, uptime_ms: u64) -> Vec<u8> {
    serde_json::to_vec(&PairingWire {
        token,
        ts: uptime_ms,
    })
    .unwrap_or_default()
}

/// Diagnostics report published on request.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    #[serde(rename = "configMode")]
    pub configuration_mode: bool,
    #[serde(rename = "linkUp")]
    pub link_up: bool,
    #[serde(rename = "brokerUp")]
    pub broker_up: bool,
    pub published: u32,
    #[serde(rename = "publishErrors")]
    pub publish_errors: u32,
    #[serde(rename = "parseErrors")]
    pub parse_errors: u32,
    #[serde(rename = "commandDrops")]
    pub command_drops: u32,
    pub uptime: u32,
    pub heap: u32,
}

pub fn encode_diagnostics(report: &DiagnosticsReport) -> Vec<u8> {
    serde_json::to_vec(report).unwrap_or_default()
}

// ───────────────────────────────────────────────────────────────
// Inbound decoding
// ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CmdEnvelope {
    cmd: heapless::String<24>,
}

/// Translate an inbound `(topic, payload)` pair into a core value.
///
/// Fails with [`CommsError::MalformedPayload`] on unparseable JSON, unknown
/// control verbs, or unexpected topics — the caller counts the failure and
/// drops the message.
pub fn decode_inbound(topic: &str, payload: &[u8]) -> Result<Inbound, CommsError> {
    if topic.ends_with("/gpio/set") {
        let cmd: Command =
            serde_json::from_slice(payload).map_err(|_| CommsError::MalformedPayload)?;
        return Ok(Inbound::Queue(cmd));
    }

    if topic.ends_with("/cmd") {
        let envelope: CmdEnvelope =
            serde_json::from_slice(payload).map_err(|_| CommsError::MalformedPayload)?;
        return match envelope.cmd.as_str() {
            "reboot" => Ok(Inbound::Control(ControlAction::Reboot)),
            "diagnostics" => Ok(Inbound::Control(ControlAction::RunDiagnostics)),
            _ => Err(CommsError::MalformedPayload),
        };
    }

    Err(CommsError::MalformedPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Rgb;

    #[test]
    fn topics_are_device_scoped() {
        assert_eq!(telemetry_topic("NL-AABBCC").as_str(), "devices/NL-AABBCC/telemetry");
        assert_eq!(gpio_topic("NL-AABBCC").as_str(), "devices/NL-AABBCC/gpio/set");
        assert_eq!(cmd_topic("NL-AABBCC").as_str(), "devices/NL-AABBCC/cmd");
    }

    #[test]
    fn telemetry_wire_field_names() {
        let sample = TelemetrySample::valid(21.5, 48.0, 120, 180_000, 120_500);
        let bytes = encode_telemetry(&sample);
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["tC"], 21.5);
        assert_eq!(v["rh"], 48.0);
        assert_eq!(v["uptime"], 120);
        assert_eq!(v["heap"], 180_000);
        assert_eq!(v["quality"], 100);
        assert_eq!(v["valid"], true);
        assert_eq!(v["ts"], 120_500);
    }

    #[test]
    fn status_reports_mode() {
        let snap = ConnectionSnapshot {
            configuration_mode: false,
            link_up: true,
            broker_up: true,
        };
        let v: serde_json::Value =
            serde_json::from_slice(&encode_status(snap, Some(-52), 9000)).unwrap();
        assert_eq!(v["online"], true);
        assert_eq!(v["wifiMode"], "STA");
        assert_eq!(v["rssi"], -52);
    }

    #[test]
    fn decodes_gpio_onto_queue() {
        let inbound = decode_inbound(
            "devices/NL-AABBCC/gpio/set",
            br#"{"type":"gpio","pin":2,"state":true}"#,
        )
        .unwrap();
        assert_eq!(inbound, Inbound::Queue(Command::Gpio { pin: 2, state: true }));
    }

    #[test]
    fn decodes_neopixel_onto_queue() {
        let inbound = decode_inbound(
            "devices/NL-AABBCC/gpio/set",
            br#"{"type":"neopixel","color":{"r":9,"g":8,"b":7}}"#,
        )
        .unwrap();
        assert_eq!(
            inbound,
            Inbound::Queue(Command::Neopixel {
                color: Rgb::new(9, 8, 7)
            })
        );
    }

    #[test]
    fn decodes_control_verbs() {
        let reboot = decode_inbound("devices/x/cmd", br#"{"cmd":"reboot"}"#).unwrap();
        assert_eq!(reboot, Inbound::Control(ControlAction::Reboot));
        let diag = decode_inbound("devices/x/cmd", br#"{"cmd":"diagnostics"}"#).unwrap();
        assert_eq!(diag, Inbound::Control(ControlAction::RunDiagnostics));
    }

    #[test]
    fn rejects_unknown_control_verb() {
        assert_eq!(
            decode_inbound("devices/x/cmd", br#"{"cmd":"format_flash"}"#),
            Err(CommsError::MalformedPayload)
        );
    }

    #[test]
    fn rejects_garbage_payload() {
        assert_eq!(
            decode_inbound("devices/x/gpio/set", b"{{{{"),
            Err(CommsError::MalformedPayload)
        );
    }

    #[test]
    fn rejects_unexpected_topic() {
        assert_eq!(
            decode_inbound("devices/x/firmware", br#"{"cmd":"reboot"}"#),
            Err(CommsError::MalformedPayload)
        );
    }
}
