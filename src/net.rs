//! Network worker — the link/broker lifecycle.
//!
//! The worker drives a small phase machine on a fixed supervisory tick
//! (100 ms by default):
//!
//! ```text
//! ConfigPending ──(identity stored)──▶ LinkConnecting ──▶ LinkUp ──▶ BrokerUp
//!       ▲                                   │                ▲          │
//!       │      (attempt window exhausted)   │                └──────────┘
//!       └───────────────────────────────────┘             broker loss / retry
//! ```
//!
//! - Association is a bounded attempt: scan (diagnostic only), then poll
//!   the transport for up to `link_attempt_iters × link_poll_interval_ms`
//!   (≈ 20 s by default). Exhaustion falls back to hosting the local
//!   configuration access point — a deliberate one-shot fallback, not a
//!   retry loop.
//! - Broker connect is one blocking attempt per tick; failures are retried
//!   opportunistically at the tick cadence with no additional backoff
//!   (each attempt is itself blocking and therefore rate-limiting).
//! - While the broker session is up, each tick services keep-alives,
//!   translates inbound messages at the boundary, and drains at most
//!   [`DRAIN_BATCH_MAX`] telemetry samples so a single tick stays short.
//!
//! This worker is the only writer of the link/broker connection flags.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::channel::{CommandChannel, SendError, TelemetryChannel};
use crate::command::ControlAction;
use crate::config::NodeConfig;
use crate::conn::ConnectionState;
use crate::ports::{BrokerPort, InboundMessage, LinkPort, LinkStatus, SystemPort};
use crate::wire::{self, Inbound};

/// Maximum telemetry samples published per tick. Remaining items stay
/// queued for the next tick, preserving FIFO order across ticks.
pub const DRAIN_BATCH_MAX: u32 = 5;

/// Consumer-side wait for one telemetry item while draining.
const TELEMETRY_RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// WPA2 password for the configuration access point.
pub const AP_PASSWORD: &str = "12345678";

/// Observable phases of the connection lifecycle. The broker-connect
/// attempt itself is a single blocking call inside a `LinkUp` tick and is
/// therefore never observable across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// No managed link; hosting the configuration access point.
    ConfigPending,
    /// Stored identity present; association attempt pending or running.
    LinkConnecting,
    /// Associated. Broker session down (or no broker configured).
    LinkUp,
    /// Associated and broker session established.
    BrokerUp,
}

/// Counters maintained by the network worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    /// Telemetry messages successfully published.
    pub published: u32,
    /// Telemetry publish failures.
    pub publish_errors: u32,
    /// Inbound payloads that failed to decode.
    pub parse_errors: u32,
    /// Commands dropped because the command channel stayed full.
    pub command_drops: u32,
    /// Association attempts that exhausted their window.
    pub link_fallbacks: u32,
    /// Failed broker connection attempts.
    pub broker_retries: u32,
}

/// The network worker. Owns the link and broker drivers and the
/// right-hand side of both channels.
pub struct NetWorker<L: LinkPort, B: BrokerPort, S: SystemPort> {
    link: L,
    broker: B,
    system: S,
    conn: Arc<ConnectionState>,
    telemetry: Arc<TelemetryChannel>,
    commands: Arc<CommandChannel>,
    config: NodeConfig,
    device_id: heapless::String<32>,
    ap_ssid: heapless::String<48>,
    phase: LinkPhase,
    stats: NetStats,
    ticks_since_status: u32,
}

impl<L: LinkPort, B: BrokerPort, S: SystemPort> NetWorker<L, B, S> {
    pub fn new(
        link: L,
        broker: B,
        system: S,
        conn: Arc<ConnectionState>,
        telemetry: Arc<TelemetryChannel>,
        commands: Arc<CommandChannel>,
        config: NodeConfig,
        device_id: &str,
    ) -> Self {
        let mut id = heapless::String::new();
        let _ = id.push_str(device_id);
        let mut ap_ssid = heapless::String::new();
        use core::fmt::Write;
        let _ = write!(ap_ssid, "{device_id}-setup");

        Self {
            link,
            broker,
            system,
            conn,
            telemetry,
            commands,
            config,
            device_id: id,
            ap_ssid,
            phase: LinkPhase::ConfigPending,
            stats: NetStats::default(),
            ticks_since_status: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Pick the boot phase from the stored configuration and apply its
    /// entry side effects. Call once before the first [`tick`](Self::tick).
    pub fn start(&mut self) {
        if self.config.has_identity() {
            info!("Net: stored identity '{}', connecting", self.config.wifi_ssid);
            self.phase = LinkPhase::LinkConnecting;
        } else {
            info!("Net: no stored identity, starting configuration mode");
            self.enter_config_mode();
        }
    }

    /// Run forever at the supervisory tick cadence.
    pub fn run(mut self) -> ! {
        self.start();
        let tick = Duration::from_millis(u64::from(self.config.net_tick_interval_ms));
        loop {
            self.tick();
            thread::sleep(tick);
        }
    }

    /// One supervisory tick.
    pub fn tick(&mut self) {
        match self.phase {
            // The access point and captive DNS are hosted by the adapter;
            // nothing to drive until an external reconfiguration.
            LinkPhase::ConfigPending => {}
            LinkPhase::LinkConnecting => self.attempt_link(),
            LinkPhase::LinkUp => {
                if !self.link.is_connected() {
                    warn!("Net: link lost while idle");
                    self.conn.mark_link_lost();
                    self.phase = LinkPhase::LinkConnecting;
                } else if self.config.has_broker() {
                    self.attempt_broker();
                }
            }
            LinkPhase::BrokerUp => self.service_broker(),
        }
    }

    /// Explicit factory-reset path: force configuration mode from any
    /// phase. The bootstrap owns the trigger (button hold / portal action).
    pub fn reset_to_config(&mut self) {
        warn!("Net: explicit reset to configuration mode");
        self.enter_config_mode();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn stats(&self) -> NetStats {
        self.stats
    }

    // ── Phase handlers ────────────────────────────────────────

    fn enter_config_mode(&mut self) {
        if let Err(e) = self
            .link
            .begin_access_point(self.ap_ssid.as_str(), AP_PASSWORD)
        {
            // The portal is unreachable but the state machine stays
            // consistent; a reset retries.
            error!("Net: access point start failed: {e}");
        } else {
            info!("Net: access point '{}' up", self.ap_ssid);
        }
        self.conn.mark_config_mode();
        self.phase = LinkPhase::ConfigPending;
    }

    /// One bounded association attempt: scan, begin, poll, and on
    /// exhaustion fall back to the configuration access point.
    fn attempt_link(&mut self) {
        let target = self.config.wifi_ssid.clone();

        match self.link.scan() {
            Ok(records) => {
                info!("Net: scan found {} networks", records.len());
                if !records.iter().any(|r| r.ssid == target) {
                    warn!("Net: target '{}' not found in scan", target);
                }
            }
            Err(e) => warn!("Net: scan failed ({e}), attempting anyway"),
        }

        info!("Net: associating with '{}'", target);
        if let Err(e) = self
            .link
            .begin_station(target.as_str(), self.config.wifi_password.as_str())
        {
            error!("Net: station start failed: {e}");
            self.stats.link_fallbacks += 1;
            self.enter_config_mode();
            return;
        }

        let poll = Duration::from_millis(u64::from(self.config.link_poll_interval_ms));
        for _ in 0..self.config.link_attempt_iters {
            if self.link.status() == LinkStatus::Connected {
                info!("Net: link up (RSSI {:?})", self.link.rssi());
                self.conn.mark_link_up();
                self.phase = LinkPhase::LinkUp;
                if self.config.has_broker() {
                    self.attempt_broker();
                }
                return;
            }
            thread::sleep(poll);
        }

        warn!(
            "Net: association window exhausted ({} x {} ms), falling back to configuration mode",
            self.config.link_attempt_iters, self.config.link_poll_interval_ms
        );
        self.stats.link_fallbacks += 1;
        self.enter_config_mode();
    }

    /// One blocking broker-connect attempt.
    fn attempt_broker(&mut self) {
        info!(
            "Net: connecting to broker {}:{}",
            self.config.mqtt_host, self.config.mqtt_port
        );

        if !self.broker.connect(self.device_id.as_str()) {
            self.stats.broker_retries += 1;
            warn!("Net: broker connect failed, retrying on next tick");
            return;
        }

        for topic in [
            wire::gpio_topic(&self.device_id),
            wire::cmd_topic(&self.device_id),
        ] {
            match self.broker.subscribe(topic.as_str()) {
                Ok(()) => info!("Net: subscribed to {topic}"),
                Err(e) => error!("Net: subscribe to {topic} failed: {e}"),
            }
        }

        self.conn.mark_broker_up();
        self.phase = LinkPhase::BrokerUp;
        self.publish_status();
        self.publish_pairing();
        info!("Net: broker session up");
    }

    /// Service an established broker session for one tick.
    fn service_broker(&mut self) {
        if !self.link.is_connected() {
            warn!("Net: link lost, dropping broker session");
            self.conn.mark_link_lost();
            self.phase = LinkPhase::LinkConnecting;
            return;
        }

        self.broker.poll();

        while let Some(msg) = self.broker.take_inbound() {
            self.handle_inbound(&msg);
        }

        self.drain_telemetry();

        self.ticks_since_status += 1;
        if self.ticks_since_status >= self.status_interval_ticks() {
            self.ticks_since_status = 0;
            self.publish_status();
        }

        if !self.broker.is_connected() {
            warn!("Net: broker connection lost");
            self.conn.mark_broker_lost();
            self.phase = LinkPhase::LinkUp;
        }
    }

    // ── Inbound boundary ──────────────────────────────────────

    /// Translate one inbound message into a queued command or an inline
    /// control action. Nothing beyond this translation runs on the
    /// network worker's connectivity path.
    fn handle_inbound(&mut self, msg: &InboundMessage) {
        match wire::decode_inbound(msg.topic.as_str(), &msg.payload) {
            Ok(Inbound::Queue(cmd)) => match self.commands.send(cmd) {
                Ok(_) => {}
                Err(SendError::Timeout) => {
                    self.stats.command_drops += 1;
                    warn!("Net: command channel full, command dropped");
                }
            },
            Ok(Inbound::Control(ControlAction::Reboot)) => {
                warn!("Net: reboot requested");
                self.system.restart();
            }
            Ok(Inbound::Control(ControlAction::RunDiagnostics)) => {
                self.publish_diagnostics();
            }
            Err(e) => {
                self.stats.parse_errors += 1;
                warn!("Net: inbound on '{}' rejected: {e}", msg.topic);
            }
        }
    }

    // ── Publishing ────────────────────────────────────────────

    fn drain_telemetry(&mut self) {
        let topic = wire::telemetry_topic(&self.device_id);
        let mut processed = 0;
        while processed < DRAIN_BATCH_MAX {
            let Some(sample) = self.telemetry.recv(TELEMETRY_RECV_TIMEOUT) else {
                break;
            };
            processed += 1;

            // Publish trustworthy data and hard failures (quality 0);
            // anything in between is not worth airtime.
            if !sample.valid && sample.quality != 0 {
                continue;
            }
            let payload = wire::encode_telemetry(&sample);
            match self.broker.publish(topic.as_str(), &payload, false) {
                Ok(()) => {
                    self.stats.published += 1;
                    if self.stats.published % 20 == 0 {
                        info!(
                            "Net: published {} telemetry messages ({} errors)",
                            self.stats.published, self.stats.publish_errors
                        );
                    }
                }
                Err(e) => {
                    self.stats.publish_errors += 1;
                    warn!("Net: telemetry publish failed: {e}");
                }
            }
        }
    }

    fn publish_status(&mut self) {
        let topic = wire::status_topic(&self.device_id);
        let payload = wire::encode_status(
            self.conn.snapshot(),
            self.link.rssi(),
            self.system.uptime_ms(),
        );
        if let Err(e) = self.broker.publish(topic.as_str(), &payload, true) {
            warn!("Net: status publish failed: {e}");
        }
    }

    fn publish_pairing(&mut self) {
        if self.config.pairing_token.is_empty() {
            return;
        }
        let topic = wire::pairing_topic(&self.device_id);
        let payload = wire::encode_pairing(&self.config.pairing_token, self.system.uptime_ms());
        match self.broker.publish(topic.as_str(), &payload, false) {
            Ok(()) => info!("Net: pairing token sent"),
            Err(e) => warn!("Net: pairing publish failed: {e}"),
        }
    }

    fn publish_diagnostics(&mut self) {
        let snapshot = self.conn.snapshot();
        let report = wire::DiagnosticsReport {
            configuration_mode: snapshot.configuration_mode,
            link_up: snapshot.link_up,
            broker_up: snapshot.broker_up,
            published: self.stats.published,
            publish_errors: self.stats.publish_errors,
            parse_errors: self.stats.parse_errors,
            command_drops: self.stats.command_drops,
            uptime: (self.system.uptime_ms() / 1000) as u32,
            heap: self.system.free_heap_bytes(),
        };
        let topic = wire::diagnostics_topic(&self.device_id);
        let payload = wire::encode_diagnostics(&report);
        match self.broker.publish(topic.as_str(), &payload, false) {
            Ok(()) => info!("Net: diagnostics published"),
            Err(e) => warn!("Net: diagnostics publish failed: {e}"),
        }
    }

    fn status_interval_ticks(&self) -> u32 {
        (self.config.status_interval_secs * 1000) / self.config.net_tick_interval_ms.max(1)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
