//! Connection state machine walked end-to-end against the simulation
//! link and broker adapters.

use std::sync::Arc;
use std::time::Duration;

use nodelink::adapters::mqtt::MqttBroker;
use nodelink::adapters::system::Esp32System;
use nodelink::adapters::wifi::WifiLink;
use nodelink::channel::{BoundedChannel, CommandChannel, SendPolicy, TelemetryChannel};
use nodelink::conn::ConnectionState;
use nodelink::net::{LinkPhase, NetWorker};

use crate::mock_ports::fast_config;

struct Rig {
    worker: NetWorker<WifiLink, MqttBroker, Esp32System>,
    conn: Arc<ConnectionState>,
    link: nodelink::adapters::wifi::SimLinkHandle,
    broker: nodelink::adapters::mqtt::SimBrokerHandle,
    #[allow(dead_code)]
    telemetry: Arc<TelemetryChannel>,
    commands: Arc<CommandChannel>,
}

fn rig(link: WifiLink, broker: MqttBroker, identity: bool, with_broker: bool) -> Rig {
    let conn = Arc::new(ConnectionState::new());
    let telemetry: Arc<TelemetryChannel> = Arc::new(BoundedChannel::new(SendPolicy::DropOldest));
    let commands: Arc<CommandChannel> = Arc::new(BoundedChannel::new(
        SendPolicy::BlockWithTimeout(Duration::from_millis(20)),
    ));
    let link_handle = link.handle();
    let broker_handle = broker.handle();
    let worker = NetWorker::new(
        link,
        broker,
        Esp32System::new(),
        Arc::clone(&conn),
        Arc::clone(&telemetry),
        Arc::clone(&commands),
        fast_config(identity, with_broker),
        "NL-AABBCC",
    );
    Rig {
        worker,
        conn,
        link: link_handle,
        broker: broker_handle,
        telemetry,
        commands,
    }
}

#[test]
fn cold_boot_without_identity_hosts_config_ap() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), false, false);
    r.worker.start();
    assert_eq!(r.worker.phase(), LinkPhase::ConfigPending);
    assert!(r.link.ap_active());
    assert!(r.conn.configuration_mode());
    assert!(!r.conn.link_up());
}

#[test]
fn cold_boot_walks_to_broker_up() {
    let mut r = rig(WifiLink::reachable(1), MqttBroker::reachable(), true, true);
    r.worker.start();
    assert_eq!(r.worker.phase(), LinkPhase::LinkConnecting);

    // One supervisory pass: bounded association, then the immediate
    // broker attempt on link-up.
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::BrokerUp);
    assert!(r.conn.link_up());
    assert!(r.conn.broker_up());

    assert_eq!(
        r.broker.subscriptions(),
        vec![
            "devices/NL-AABBCC/gpio/set".to_string(),
            "devices/NL-AABBCC/cmd".to_string(),
        ]
    );
    let status = r.broker.published_on("/status");
    assert_eq!(status.len(), 1);
    assert!(status[0].2, "online status must be retained");
    assert_eq!(r.broker.published_on("/pair").len(), 1);
}

#[test]
fn unreachable_network_falls_back_once_to_config_ap() {
    let mut r = rig(WifiLink::unreachable(), MqttBroker::reachable(), true, true);
    r.worker.start();
    r.worker.tick();

    assert_eq!(r.worker.phase(), LinkPhase::ConfigPending);
    assert!(r.link.ap_active());
    assert!(r.conn.configuration_mode());
    assert_eq!(r.worker.stats().link_fallbacks, 1);

    // Parked: no further association attempts without an external trigger.
    for _ in 0..20 {
        r.worker.tick();
    }
    assert_eq!(r.link.station_attempts(), 1);
}

#[test]
fn no_broker_address_idles_in_link_up() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), true, false);
    r.worker.start();
    for _ in 0..50 {
        r.worker.tick();
    }
    assert_eq!(r.worker.phase(), LinkPhase::LinkUp);
    assert!(!r.conn.broker_up());
    assert_eq!(r.broker.connect_attempts(), 0);
}

#[test]
fn broker_refusal_is_retried_at_tick_cadence() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::unreachable(), true, true);
    r.worker.start();
    r.worker.tick(); // association + first broker attempt
    for _ in 0..4 {
        r.worker.tick();
    }
    assert_eq!(r.worker.phase(), LinkPhase::LinkUp);
    assert_eq!(r.broker.connect_attempts(), 5);

    // The broker comes back; the next tick lands the session.
    r.broker.set_reachable(true);
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::BrokerUp);
}

#[test]
fn link_drop_triggers_full_reassociation_and_broker_reconnect() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), true, true);
    r.worker.start();
    r.worker.tick();
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::BrokerUp);

    r.link.drop_link();
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::LinkConnecting);
    assert!(!r.conn.link_up());
    assert!(!r.conn.broker_up());

    // Next supervisory pass: associate again and reconnect the broker.
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::BrokerUp);
    assert!(r.conn.broker_up());
    assert_eq!(r.link.station_attempts(), 2);
}

#[test]
fn broker_session_drop_keeps_link_and_reconnects() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), true, true);
    r.worker.start();
    r.worker.tick();
    r.worker.tick();

    r.broker.drop_session();
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::LinkUp);
    assert!(r.conn.link_up());
    assert!(!r.conn.broker_up());

    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::BrokerUp);
    assert!(r.conn.broker_up());
}

#[test]
fn explicit_reset_returns_to_config_from_broker_up() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), true, true);
    r.worker.start();
    r.worker.tick();
    r.worker.tick();
    assert_eq!(r.worker.phase(), LinkPhase::BrokerUp);

    r.worker.reset_to_config();
    assert_eq!(r.worker.phase(), LinkPhase::ConfigPending);
    assert!(r.link.ap_active());
    let snapshot = r.conn.snapshot();
    assert!(snapshot.configuration_mode);
    assert!(!snapshot.link_up);
    assert!(!snapshot.broker_up);
}

#[test]
fn reboot_command_is_not_queued_for_actuation() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), true, true);
    r.worker.start();
    r.worker.tick();
    r.worker.tick();

    r.broker
        .inject("devices/NL-AABBCC/cmd", br#"{"cmd":"reboot"}"#);
    r.worker.tick();
    assert!(r.commands.is_empty());
}

#[test]
fn diagnostics_command_publishes_report() {
    let mut r = rig(WifiLink::reachable(0), MqttBroker::reachable(), true, true);
    r.worker.start();
    r.worker.tick();
    r.worker.tick();

    r.broker
        .inject("devices/NL-AABBCC/cmd", br#"{"cmd":"diagnostics"}"#);
    r.worker.tick();

    let reports = r.broker.published_on("/diag");
    assert_eq!(reports.len(), 1);
    let v: serde_json::Value = serde_json::from_slice(&reports[0].1).unwrap();
    assert_eq!(v["linkUp"], true);
    assert_eq!(v["brokerUp"], true);
    assert_eq!(v["configMode"], false);
}
