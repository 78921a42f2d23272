//! Hardware adapters — sensor bus, output bank, and status indicator.
//!
//! This is the only module that touches actual peripherals. The DHT20
//! driver is generic over `embedded_hal::i2c::I2c`, so the same
//! transaction code runs against the ESP-IDF I2C driver on the device and
//! against a scripted bus in host tests. Output bank and indicator carry
//! cfg-gated simulation backends like the rest of the adapters.

use crate::command::Rgb;
use crate::error::{ActuatorError, SensorError};
use crate::ports::{IndicatorPort, OutputBank, RawReading, SensorBus, OUTPUT_CHANNELS};

// ───────────────────────────────────────────────────────────────
// DHT20 temperature/humidity sensor
// ───────────────────────────────────────────────────────────────

/// Fixed DHT20 I2C address.
pub const DHT20_ADDR: u8 = 0x38;

/// Measurement delay after triggering, per datasheet (>75 ms).
const MEASUREMENT_DELAY_MS: u64 = 80;

/// DHT20 over any `embedded-hal` I2C bus.
pub struct Dht20Bus<I> {
    i2c: I,
}

impl<I: embedded_hal::i2c::I2c> Dht20Bus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    fn status(&mut self) -> Result<u8, SensorError> {
        let mut status = [0u8; 1];
        self.i2c
            .write_read(DHT20_ADDR, &[0x71], &mut status)
            .map_err(|_| SensorError::BusReadFailed)?;
        Ok(status[0])
    }
}

impl<I: embedded_hal::i2c::I2c> SensorBus for Dht20Bus<I> {
    fn init(&mut self) -> Result<(), SensorError> {
        let status = self.status()?;
        // Calibration bits must be set; the factory state normally has
        // them, so anything else means the device is not usable yet.
        if status & 0x18 != 0x18 {
            return Err(SensorError::NotReady);
        }
        Ok(())
    }

    fn read_sample(&mut self) -> Result<RawReading, SensorError> {
        // Trigger measurement.
        self.i2c
            .write(DHT20_ADDR, &[0xAC, 0x33, 0x00])
            .map_err(|_| SensorError::BusReadFailed)?;
        std::thread::sleep(std::time::Duration::from_millis(MEASUREMENT_DELAY_MS));

        let mut frame = [0u8; 7];
        self.i2c
            .read(DHT20_ADDR, &mut frame)
            .map_err(|_| SensorError::BusReadFailed)?;

        // Busy bit still set: measurement did not finish.
        if frame[0] & 0x80 != 0 {
            return Err(SensorError::NotReady);
        }
        if crc8(&frame[..6]) != frame[6] {
            return Err(SensorError::CrcMismatch);
        }

        let raw_h = (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
        let raw_t = ((u32::from(frame[3]) & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

        Ok(RawReading {
            humidity_pct: raw_h as f32 / 1_048_576.0 * 100.0,
            temperature_c: raw_t as f32 / 1_048_576.0 * 200.0 - 50.0,
        })
    }
}

/// CRC-8 as used by the DHT20 (poly 0x31, init 0xFF).
fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

// ───────────────────────────────────────────────────────────────
// Output bank
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_outputs::GpioOutputBank;

#[cfg(target_os = "espidf")]
mod esp_outputs {
    use super::*;
    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

    /// Eight GPIO-driven output channels.
    pub struct GpioOutputBank {
        pins: [PinDriver<'static, AnyOutputPin, Output>; OUTPUT_CHANNELS],
        states: [bool; OUTPUT_CHANNELS],
    }

    impl GpioOutputBank {
        pub fn new(pins: [PinDriver<'static, AnyOutputPin, Output>; OUTPUT_CHANNELS]) -> Self {
            Self {
                pins,
                states: [false; OUTPUT_CHANNELS],
            }
        }
    }

    impl OutputBank for GpioOutputBank {
        fn all_off(&mut self) {
            for (i, pin) in self.pins.iter_mut().enumerate() {
                let _ = pin.set_low();
                self.states[i] = false;
            }
        }

        fn set_channel(&mut self, index: usize, on: bool) -> Result<(), ActuatorError> {
            let pin = self.pins.get_mut(index).ok_or(ActuatorError::InvalidChannel)?;
            let result = if on { pin.set_high() } else { pin.set_low() };
            result.map_err(|_| ActuatorError::GpioWriteFailed)?;
            self.states[index] = on;
            Ok(())
        }

        fn states(&self) -> [bool; OUTPUT_CHANNELS] {
            self.states
        }
    }
}

/// In-memory output bank for host tests and simulation.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct GpioOutputBank {
    states: [bool; OUTPUT_CHANNELS],
}

#[cfg(not(target_os = "espidf"))]
impl GpioOutputBank {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl OutputBank for GpioOutputBank {
    fn all_off(&mut self) {
        self.states = [false; OUTPUT_CHANNELS];
        log::info!("GPIO(sim): all channels off");
    }

    fn set_channel(&mut self, index: usize, on: bool) -> Result<(), ActuatorError> {
        if index >= OUTPUT_CHANNELS {
            return Err(ActuatorError::InvalidChannel);
        }
        self.states[index] = on;
        log::info!("GPIO(sim): channel {} -> {}", index + 1, if on { "ON" } else { "OFF" });
        Ok(())
    }

    fn states(&self) -> [bool; OUTPUT_CHANNELS] {
        self.states
    }
}

// ───────────────────────────────────────────────────────────────
// Status indicator
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_indicator::NeoPixelIndicator;

#[cfg(target_os = "espidf")]
mod esp_indicator {
    use super::*;
    use core::time::Duration;
    use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, TxRmtDriver};
    use std::sync::{Mutex, PoisonError};

    /// Single WS2812 pixel on an RMT channel.
    pub struct NeoPixelIndicator {
        tx: Mutex<TxRmtDriver<'static>>,
    }

    impl NeoPixelIndicator {
        pub fn new(tx: TxRmtDriver<'static>) -> Self {
            Self { tx: Mutex::new(tx) }
        }

        fn write(&self, rgb: Rgb) -> anyhow::Result<()> {
            let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            let ticks_hz = tx.counter_clock()?;
            let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(350))?;
            let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(800))?;
            let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(700))?;
            let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(600))?;

            // WS2812 bit order is GRB, MSB first.
            let colour: u32 =
                (u32::from(rgb.g) << 16) | (u32::from(rgb.r) << 8) | u32::from(rgb.b);
            let mut signal = FixedLengthSignal::<24>::new();
            for i in (0..24).rev() {
                let bit = (colour >> i) & 1 != 0;
                let (high, low) = if bit { (t1h, t1l) } else { (t0h, t0l) };
                signal.set(23 - i as usize, &(high, low))?;
            }
            tx.start_blocking(&signal)?;
            Ok(())
        }
    }

    impl IndicatorPort for NeoPixelIndicator {
        fn set_rgb(&self, rgb: Rgb) {
            if let Err(e) = self.write(rgb) {
                log::warn!("NeoPixel: write failed: {e}");
            }
        }
    }
}

/// In-memory indicator for host tests and simulation.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct NeoPixelIndicator {
    last: std::sync::Mutex<Option<Rgb>>,
}

#[cfg(not(target_os = "espidf"))]
impl NeoPixelIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last colour written, for assertions.
    pub fn last(&self) -> Option<Rgb> {
        *self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(not(target_os = "espidf"))]
impl IndicatorPort for NeoPixelIndicator {
    fn set_rgb(&self, rgb: Rgb) {
        *self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(rgb);
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
