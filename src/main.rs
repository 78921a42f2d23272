//! Nodelink firmware — main entry point.
//!
//! Bootstrap sequence:
//!
//! 1. ESP-IDF patches + logger.
//! 2. NVS init and config load (absent config → defaults → configuration
//!    mode).
//! 3. Create the synchronisation primitives: connection state, telemetry
//!    channel (DropOldest), command channel (BlockWithTimeout), bus guard.
//! 4. Construct the adapters and spawn the workers, pinned to cores the
//!    way the protocol timing wants it: network worker on core 1 (prompt
//!    keep-alive servicing), acquisition/actuation and indicator on core 0.
//! 5. Supervise the reset button: a 3 s hold clears the stored config and
//!    reboots into configuration mode.
//!
//! ```text
//! ┌───────────────┐ telemetry  ┌───────────────┐
//! │ Acquisition   │───────────▶│               │──▶ broker
//! │ (core 0, 1 s) │  DropOldest│  Net worker   │
//! └───────┬───────┘            │ (core 1,100ms)│◀── broker
//!         │ BusGuard           └───────┬───────┘
//!     [sensor bus]                     │ commands (BlockWithTimeout)
//!                                      ▼
//! ┌───────────────┐            ┌───────────────┐
//! │ Indicator     │◀─ conn ──  │ Actuation     │
//! │ (core 0,500ms)│   state    │ (core 0,100ms)│──▶ outputs
//! └───────────────┘            └───────────────┘
//! ```

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use log::{info, warn};

    use esp_idf_hal::cpu::Core;
    use esp_idf_hal::gpio::{AnyOutputPin, PinDriver, Pull};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::rmt::config::TransmitConfig;
    use esp_idf_hal::rmt::TxRmtDriver;
    use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::EspWifi;

    use nodelink::adapters::device_id;
    use nodelink::adapters::hardware::{Dht20Bus, GpioOutputBank, NeoPixelIndicator};
    use nodelink::adapters::mqtt::MqttBroker;
    use nodelink::adapters::nvs::NvsStore;
    use nodelink::adapters::system::Esp32System;
    use nodelink::adapters::wifi::WifiLink;
    use nodelink::bus::BusGuard;
    use nodelink::channel::{BoundedChannel, CommandChannel, SendPolicy, TelemetryChannel};
    use nodelink::config::NodeRole;
    use nodelink::conn::ConnectionState;
    use nodelink::net::NetWorker;
    use nodelink::ports::ConfigStore;
    use nodelink::workers::acquire::AcquisitionWorker;
    use nodelink::workers::actuate::ActuationWorker;
    use nodelink::workers::indicator::IndicatorWorker;

    /// Hold duration for the factory-reset button.
    const RESET_HOLD: Duration = Duration::from_secs(3);

    fn spawn_pinned(
        name: &'static [u8],
        core: Core,
        stack_size: usize,
        priority: u8,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        ThreadSpawnConfiguration {
            name: Some(name),
            stack_size,
            priority,
            pin_to_core: Some(core),
            ..Default::default()
        }
        .set()
        .context("thread spawn configuration")?;
        std::thread::Builder::new()
            .stack_size(stack_size)
            .spawn(body)
            .context("worker spawn")?;
        ThreadSpawnConfiguration::default()
            .set()
            .context("thread spawn configuration reset")?;
        Ok(())
    }

    pub fn run() -> Result<()> {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;

        info!("Nodelink v{} starting", env!("CARGO_PKG_VERSION"));

        // ── Config ────────────────────────────────────────────
        // A dead config store is fatal: without it neither the boot-phase
        // decision nor the reset path can work.
        let mut store = NvsStore::new()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("NVS init")?;
        let config = match store.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Config load failed ({e}), using defaults");
                nodelink::config::NodeConfig::default()
            }
        };

        let mac = device_id::read_mac();
        let dev_id = device_id::device_id(&mac);
        info!("Device ID: {} (role {:?})", dev_id, config.role);

        // ── Synchronisation primitives ────────────────────────
        let conn = Arc::new(ConnectionState::new());
        let telemetry: Arc<TelemetryChannel> =
            Arc::new(BoundedChannel::new(SendPolicy::DropOldest));
        let commands: Arc<CommandChannel> =
            Arc::new(BoundedChannel::new(SendPolicy::BlockWithTimeout(
                Duration::from_millis(u64::from(config.command_send_timeout_ms)),
            )));

        // ── Peripherals and adapters ──────────────────────────
        let peripherals = Peripherals::take().context("peripherals")?;
        let sysloop = EspSystemEventLoop::take().context("system event loop")?;
        let nvs_partition = EspDefaultNvsPartition::take().context("NVS partition")?;

        let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))
            .context("WiFi driver")?;
        let link = WifiLink::new(wifi);
        let broker = MqttBroker::new(&config.mqtt_host, config.mqtt_port);

        let led_tx = TxRmtDriver::new(
            peripherals.rmt.channel0,
            peripherals.pins.gpio45,
            &TransmitConfig::new().clock_divider(1),
        )
        .context("RMT driver")?;
        let indicator = Arc::new(NeoPixelIndicator::new(led_tx));

        // ── Workers ───────────────────────────────────────────
        let net = NetWorker::new(
            link,
            broker,
            Esp32System::new(),
            Arc::clone(&conn),
            Arc::clone(&telemetry),
            Arc::clone(&commands),
            config.clone(),
            dev_id.as_str(),
        );
        spawn_pinned(b"net\0", Core::Core1, 8192, 5, move || net.run())?;

        match config.role {
            NodeRole::Sensor => {
                let i2c = esp_idf_hal::i2c::I2cDriver::new(
                    peripherals.i2c0,
                    peripherals.pins.gpio11,
                    peripherals.pins.gpio12,
                    &esp_idf_hal::i2c::config::Config::new()
                        .baudrate(esp_idf_hal::units::KiloHertz(100).into()),
                )
                .context("I2C driver")?;
                let guard = Arc::new(BusGuard::new(Dht20Bus::new(i2c)));
                let acquire = AcquisitionWorker::new(
                    guard,
                    Esp32System::new(),
                    Arc::clone(&conn),
                    Arc::clone(&telemetry),
                    &config,
                );
                spawn_pinned(b"acquire\0", Core::Core0, 4096, 4, move || acquire.run())?;
            }
            NodeRole::Actuator => {
                // Channels 1-8 on the actuator header.
                let pins: [AnyOutputPin; 8] = [
                    peripherals.pins.gpio5.into(),
                    peripherals.pins.gpio6.into(),
                    peripherals.pins.gpio7.into(),
                    peripherals.pins.gpio8.into(),
                    peripherals.pins.gpio9.into(),
                    peripherals.pins.gpio10.into(),
                    peripherals.pins.gpio21.into(),
                    peripherals.pins.gpio38.into(),
                ];
                let mut drivers = Vec::with_capacity(pins.len());
                for pin in pins {
                    drivers.push(PinDriver::output(pin).context("output pin")?);
                }
                let bank = GpioOutputBank::new(
                    drivers
                        .try_into()
                        .map_err(|_| anyhow::anyhow!("output bank size"))?,
                );
                let actuate = ActuationWorker::new(
                    Arc::clone(&commands),
                    bank,
                    Arc::clone(&indicator),
                    &config,
                );
                spawn_pinned(b"actuate\0", Core::Core0, 4096, 4, move || actuate.run())?;
            }
        }

        let ind_worker =
            IndicatorWorker::new(Arc::clone(&conn), Arc::clone(&indicator), &config);
        spawn_pinned(b"indicator\0", Core::Core0, 3072, 2, move || ind_worker.run())?;

        info!("Workers running, supervising reset button");

        // ── Reset button supervision ──────────────────────────
        let mut button = PinDriver::input(peripherals.pins.gpio0).context("reset button")?;
        button.set_pull(Pull::Up).context("reset button pull-up")?;

        let mut held_since: Option<std::time::Instant> = None;
        loop {
            let pressed = button.is_low();
            match (pressed, held_since) {
                (true, None) => held_since = Some(std::time::Instant::now()),
                (true, Some(start)) if start.elapsed() >= RESET_HOLD => {
                    warn!("Reset button held {RESET_HOLD:?}: clearing config and rebooting");
                    if let Err(e) = store.clear() {
                        warn!("Config clear failed: {e}");
                    }
                    std::thread::sleep(Duration::from_millis(500));
                    unsafe { esp_idf_svc::sys::esp_restart() }
                }
                (false, Some(_)) => held_since = None,
                _ => {}
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("nodelink: this binary targets ESP-IDF; run `cargo test` for the host simulation");
}
