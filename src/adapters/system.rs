//! System services adapter.
//!
//! Implements [`SystemPort`]: monotonic uptime from the ESP-IDF
//! high-resolution timer, free-heap statistics, and the hard-restart
//! escape hatch. The host backend uses `std::time::Instant` and records
//! restart requests instead of performing them.

use crate::ports::SystemPort;

pub struct Esp32System {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl Default for Esp32System {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32System {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Simulation only: how many restarts were requested.
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts_requested(&self) -> u32 {
        self.restarts
    }
}

#[cfg(target_os = "espidf")]
impl SystemPort for Esp32System {
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    fn free_heap_bytes(&self) -> u32 {
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    fn restart(&mut self) {
        log::warn!("System: restarting");
        unsafe { esp_idf_svc::sys::esp_restart() }
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemPort for Esp32System {
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn free_heap_bytes(&self) -> u32 {
        // Fixed plausible figure for the simulation.
        180_000
    }

    fn restart(&mut self) {
        log::warn!("System(sim): restart requested");
        self.restarts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic() {
        let sys = Esp32System::new();
        let a = sys.uptime_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = sys.uptime_ms();
        assert!(b >= a);
    }

    #[test]
    fn sim_restart_is_recorded_not_performed() {
        let mut sys = Esp32System::new();
        sys.restart();
        sys.restart();
        assert_eq!(sys.restarts_requested(), 2);
    }
}
