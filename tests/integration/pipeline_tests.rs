//! End-to-end data-path tests: sensor bus → telemetry channel → broker,
//! and broker → command channel → outputs.

use std::sync::Arc;
use std::time::Duration;

use nodelink::adapters::hardware::{GpioOutputBank, NeoPixelIndicator};
use nodelink::adapters::mqtt::MqttBroker;
use nodelink::adapters::system::Esp32System;
use nodelink::adapters::wifi::WifiLink;
use nodelink::bus::BusGuard;
use nodelink::channel::{BoundedChannel, CommandChannel, SendPolicy, TelemetryChannel};
use nodelink::command::Rgb;
use nodelink::conn::ConnectionState;
use nodelink::net::{LinkPhase, NetWorker};
use nodelink::workers::acquire::AcquisitionWorker;
use nodelink::workers::actuate::ActuationWorker;

use crate::mock_ports::{fast_config, FixedSystem, ScriptedSensorBus};

struct Rig {
    net: NetWorker<WifiLink, MqttBroker, Esp32System>,
    conn: Arc<ConnectionState>,
    broker: nodelink::adapters::mqtt::SimBrokerHandle,
    telemetry: Arc<TelemetryChannel>,
    commands: Arc<CommandChannel>,
}

/// A rig whose network worker has already reached `BrokerUp`.
fn online_rig() -> Rig {
    let conn = Arc::new(ConnectionState::new());
    let telemetry: Arc<TelemetryChannel> = Arc::new(BoundedChannel::new(SendPolicy::DropOldest));
    let commands: Arc<CommandChannel> = Arc::new(BoundedChannel::new(
        SendPolicy::BlockWithTimeout(Duration::from_millis(20)),
    ));
    let broker = MqttBroker::reachable();
    let broker_handle = broker.handle();
    let mut net = NetWorker::new(
        WifiLink::reachable(0),
        broker,
        Esp32System::new(),
        Arc::clone(&conn),
        Arc::clone(&telemetry),
        Arc::clone(&commands),
        fast_config(true, true),
        "NL-AABBCC",
    );
    net.start();
    net.tick();
    net.tick();
    assert_eq!(net.phase(), LinkPhase::BrokerUp);
    Rig {
        net,
        conn,
        broker: broker_handle,
        telemetry,
        commands,
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor → broker
// ───────────────────────────────────────────────────────────────

#[test]
fn sensor_readings_reach_the_broker() {
    let mut r = online_rig();
    let guard = Arc::new(BusGuard::new(ScriptedSensorBus::steady(21.5, 48.0)));
    let mut acquire = AcquisitionWorker::new(
        guard,
        FixedSystem { uptime_ms: 60_000 },
        Arc::clone(&r.conn),
        Arc::clone(&r.telemetry),
        &fast_config(true, true),
    );
    acquire.init_sensor();

    for _ in 0..3 {
        acquire.cycle();
    }
    assert_eq!(r.telemetry.len(), 3);

    r.net.tick();
    let published = r.broker.published_on("/telemetry");
    assert_eq!(published.len(), 3);
    let v: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(v["tC"], 21.5);
    assert_eq!(v["rh"], 48.0);
    assert_eq!(v["valid"], true);
    assert_eq!(v["quality"], 100);
    assert_eq!(v["uptime"], 60);
}

#[test]
fn failed_cycles_surface_as_quality_zero_telemetry() {
    let mut r = online_rig();
    let guard = Arc::new(BusGuard::new(ScriptedSensorBus::new(vec![Err(
        nodelink::SensorError::BusReadFailed,
    )])));
    let mut acquire = AcquisitionWorker::new(
        guard,
        FixedSystem { uptime_ms: 1000 },
        Arc::clone(&r.conn),
        Arc::clone(&r.telemetry),
        &fast_config(true, true),
    );

    acquire.cycle();
    r.net.tick();

    let published = r.broker.published_on("/telemetry");
    assert_eq!(published.len(), 1);
    let v: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(v["valid"], false);
    assert_eq!(v["quality"], 0);
    assert_eq!(v["tC"], -1.0);
}

#[test]
fn burst_larger_than_queue_keeps_only_newest_samples() {
    let mut r = online_rig();
    let guard = Arc::new(BusGuard::new(ScriptedSensorBus::steady(20.0, 50.0)));
    let mut acquire = AcquisitionWorker::new(
        guard,
        FixedSystem { uptime_ms: 5000 },
        Arc::clone(&r.conn),
        Arc::clone(&r.telemetry),
        &fast_config(true, true),
    );

    // 15 cycles into a depth-10 queue with no draining.
    for _ in 0..15 {
        acquire.cycle();
    }
    assert_eq!(r.telemetry.len(), 10);
    assert_eq!(acquire.stats().evictions, 5);

    // Three ticks at 5 per tick drain exactly the surviving 10.
    r.net.tick();
    r.net.tick();
    r.net.tick();
    assert_eq!(r.broker.published_on("/telemetry").len(), 10);
    assert!(r.telemetry.is_empty());
}

// ───────────────────────────────────────────────────────────────
// Broker → outputs
// ───────────────────────────────────────────────────────────────

#[test]
fn gpio_command_round_trip_sets_output() {
    let mut r = online_rig();
    let indicator = Arc::new(NeoPixelIndicator::new());
    let mut actuate = ActuationWorker::new(
        Arc::clone(&r.commands),
        GpioOutputBank::new(),
        Arc::clone(&indicator),
        &fast_config(true, true),
    );
    actuate.init_outputs();

    r.broker.inject(
        "devices/NL-AABBCC/gpio/set",
        br#"{"type":"gpio","pin":5,"state":true}"#,
    );
    r.net.tick();
    actuate.cycle();

    assert!(actuate.output_states()[4]);
    assert_eq!(actuate.stats().processed, 1);
    assert_eq!(actuate.stats().errors, 0);
}

#[test]
fn indicator_command_round_trip_sets_colour() {
    let mut r = online_rig();
    let indicator = Arc::new(NeoPixelIndicator::new());
    let mut actuate = ActuationWorker::new(
        Arc::clone(&r.commands),
        GpioOutputBank::new(),
        Arc::clone(&indicator),
        &fast_config(true, true),
    );

    r.broker.inject(
        "devices/NL-AABBCC/gpio/set",
        br#"{"type":"neopixel","color":{"r":10,"g":20,"b":30}}"#,
    );
    r.net.tick();
    actuate.cycle();

    assert_eq!(indicator.last(), Some(Rgb::new(10, 20, 30)));
}

#[test]
fn unknown_command_type_is_counted_but_harmless() {
    let mut r = online_rig();
    let indicator = Arc::new(NeoPixelIndicator::new());
    let mut actuate = ActuationWorker::new(
        Arc::clone(&r.commands),
        GpioOutputBank::new(),
        Arc::clone(&indicator),
        &fast_config(true, true),
    );

    r.broker.inject(
        "devices/NL-AABBCC/gpio/set",
        br#"{"type":"servo","angle":90}"#,
    );
    r.broker.inject(
        "devices/NL-AABBCC/gpio/set",
        br#"{"type":"gpio","pin":1,"state":true}"#,
    );
    r.net.tick();
    actuate.cycle();
    actuate.cycle();

    // The unknown tag was counted; the following command still applied.
    assert_eq!(actuate.stats().errors, 1);
    assert!(actuate.output_states()[0]);
}

#[test]
fn out_of_range_pin_from_wire_never_touches_outputs() {
    let mut r = online_rig();
    let indicator = Arc::new(NeoPixelIndicator::new());
    let mut actuate = ActuationWorker::new(
        Arc::clone(&r.commands),
        GpioOutputBank::new(),
        Arc::clone(&indicator),
        &fast_config(true, true),
    );

    r.broker.inject(
        "devices/NL-AABBCC/gpio/set",
        br#"{"type":"gpio","pin":12,"state":true}"#,
    );
    r.net.tick();
    actuate.cycle();

    assert_eq!(actuate.output_states(), [false; 8]);
    assert_eq!(actuate.stats().errors, 1);
}
