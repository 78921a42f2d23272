//! WiFi link adapter.
//!
//! Implements [`LinkPort`] over the ESP-IDF WiFi driver: station-mode
//! association (polled by the network worker), diagnostic scans, and the
//! configuration access point with its captive DNS responder.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: a scripted simulation used by the host tests;
//!   association completes after a configurable number of status polls,
//!   or never for an unreachable network. A [`SimLinkHandle`] lets tests
//!   drop the link from outside while the worker owns the adapter.

use log::info;

use crate::error::CommsError;
use crate::ports::{LinkPort, LinkStatus, ScanRecord};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

/// Address the access point hands out and the captive DNS answers with.
pub const AP_ADDR: [u8; 4] = [192, 168, 4, 1];

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiLink {
    wifi: EspWifi<'static>,
    connecting: bool,
    captive_dns: Option<crate::adapters::dns::CaptiveDns>,
}

#[cfg(target_os = "espidf")]
impl WifiLink {
    /// Wrap an initialised WiFi driver (constructed in the bootstrap from
    /// the modem peripheral, event loop, and NVS partition).
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self {
            wifi,
            connecting: false,
            captive_dns: None,
        }
    }
}

#[cfg(target_os = "espidf")]
impl LinkPort for WifiLink {
    fn scan(&mut self) -> Result<heapless::Vec<ScanRecord, 16>, CommsError> {
        let found = self.wifi.scan().map_err(|_| CommsError::ScanFailed)?;
        let mut records = heapless::Vec::new();
        for ap in found {
            let mut ssid = heapless::String::new();
            let _ = ssid.push_str(ap.ssid.as_str());
            if records
                .push(ScanRecord {
                    ssid,
                    rssi: ap.signal_strength,
                })
                .is_err()
            {
                break;
            }
        }
        Ok(records)
    }

    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), CommsError> {
        self.captive_dns = None;

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| CommsError::LinkConnectFailed)?,
            password: password
                .try_into()
                .map_err(|_| CommsError::LinkConnectFailed)?,
            auth_method,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| CommsError::LinkConnectFailed)?;
        self.wifi.start().map_err(|_| CommsError::LinkConnectFailed)?;
        self.wifi
            .connect()
            .map_err(|_| CommsError::LinkConnectFailed)?;
        self.connecting = true;
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        if self.wifi.is_connected().unwrap_or(false) {
            LinkStatus::Connected
        } else if self.connecting {
            LinkStatus::Connecting
        } else {
            LinkStatus::Idle
        }
    }

    fn begin_access_point(&mut self, ssid: &str, password: &str) -> Result<(), CommsError> {
        let ap = AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| CommsError::AccessPointFailed)?,
            password: password
                .try_into()
                .map_err(|_| CommsError::AccessPointFailed)?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::AccessPoint(ap))
            .map_err(|_| CommsError::AccessPointFailed)?;
        self.wifi
            .start()
            .map_err(|_| CommsError::AccessPointFailed)?;
        self.connecting = false;

        // Captive redirection: answer every name query with our own
        // address so clients land on the configuration interface.
        self.captive_dns = crate::adapters::dns::CaptiveDns::spawn(AP_ADDR.into()).ok();
        info!("WiFi: AP '{}' hosting configuration portal", ssid);
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        let mut ap_info: esp_idf_svc::sys::wifi_ap_record_t = Default::default();
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == esp_idf_svc::sys::ESP_OK).then_some(ap_info.rssi)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    pub(super) struct SimState {
        /// `Some(n)`: association completes after n status polls.
        /// `None`: the network is unreachable.
        pub connect_after_polls: Option<u32>,
        pub polls: AtomicU32,
        pub connected: AtomicBool,
        pub connecting: AtomicBool,
        pub ap_active: AtomicBool,
        pub station_attempts: AtomicU32,
        pub visible_networks: Mutex<Vec<(heapless::String<32>, i8)>>,
    }

    /// External control of a simulated link (held by tests while the
    /// worker owns the adapter itself).
    #[derive(Clone)]
    pub struct SimLinkHandle(pub(super) Arc<SimState>);

    impl SimLinkHandle {
        /// Simulate an abrupt link drop. The link stays down until the
        /// worker starts a fresh association attempt.
        pub fn drop_link(&self) {
            self.0.connected.store(false, Ordering::SeqCst);
            self.0.connecting.store(false, Ordering::SeqCst);
        }

        pub fn is_connected(&self) -> bool {
            self.0.connected.load(Ordering::SeqCst)
        }

        pub fn ap_active(&self) -> bool {
            self.0.ap_active.load(Ordering::SeqCst)
        }

        pub fn station_attempts(&self) -> u32 {
            self.0.station_attempts.load(Ordering::SeqCst)
        }

        pub fn add_visible(&self, ssid: &str, rssi: i8) {
            let mut s = heapless::String::new();
            let _ = s.push_str(ssid);
            self.0
                .visible_networks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((s, rssi));
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::SimLinkHandle;

#[cfg(not(target_os = "espidf"))]
pub struct WifiLink {
    state: std::sync::Arc<sim::SimState>,
    captive_dns: Option<crate::adapters::dns::CaptiveDns>,
}

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    fn with_reachability(connect_after_polls: Option<u32>) -> Self {
        use std::sync::atomic::{AtomicBool, AtomicU32};
        Self {
            state: std::sync::Arc::new(sim::SimState {
                connect_after_polls,
                polls: AtomicU32::new(0),
                connected: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                ap_active: AtomicBool::new(false),
                station_attempts: AtomicU32::new(0),
                visible_networks: std::sync::Mutex::new(Vec::new()),
            }),
            captive_dns: None,
        }
    }

    /// A link whose target network associates after `polls` status polls.
    pub fn reachable(polls: u32) -> Self {
        Self::with_reachability(Some(polls))
    }

    /// A link whose target network never associates.
    pub fn unreachable() -> Self {
        Self::with_reachability(None)
    }

    /// Control handle for tests.
    pub fn handle(&self) -> SimLinkHandle {
        SimLinkHandle(std::sync::Arc::clone(&self.state))
    }

    /// Port the captive DNS responder listens on, when the AP is up.
    pub fn captive_dns_port(&self) -> Option<u16> {
        self.captive_dns.as_ref().map(|d| d.port())
    }
}

#[cfg(not(target_os = "espidf"))]
impl LinkPort for WifiLink {
    fn scan(&mut self) -> Result<heapless::Vec<ScanRecord, 16>, CommsError> {
        use std::sync::PoisonError;
        let mut records = heapless::Vec::new();
        let visible = self
            .state
            .visible_networks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (ssid, rssi) in visible.iter() {
            if records
                .push(ScanRecord {
                    ssid: ssid.clone(),
                    rssi: *rssi,
                })
                .is_err()
            {
                break;
            }
        }
        info!("WiFi(sim): scan found {} networks", records.len());
        Ok(records)
    }

    fn begin_station(&mut self, ssid: &str, _password: &str) -> Result<(), CommsError> {
        use std::sync::atomic::Ordering;
        info!("WiFi(sim): associating with '{}'", ssid);
        self.captive_dns = None;
        self.state.ap_active.store(false, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.polls.store(0, Ordering::SeqCst);
        self.state.connecting.store(true, Ordering::SeqCst);
        self.state.station_attempts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        use std::sync::atomic::Ordering;
        if self.state.connected.load(Ordering::SeqCst) {
            return LinkStatus::Connected;
        }
        if !self.state.connecting.load(Ordering::SeqCst) {
            return LinkStatus::Idle;
        }
        match self.state.connect_after_polls {
            Some(n) if self.state.polls.load(Ordering::SeqCst) >= n => {
                self.state.connected.store(true, Ordering::SeqCst);
                LinkStatus::Connected
            }
            _ => {
                self.state.polls.fetch_add(1, Ordering::SeqCst);
                LinkStatus::Connecting
            }
        }
    }

    fn begin_access_point(&mut self, ssid: &str, _password: &str) -> Result<(), CommsError> {
        use std::sync::atomic::Ordering;
        self.state.connecting.store(false, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.ap_active.store(true, Ordering::SeqCst);
        self.captive_dns = crate::adapters::dns::CaptiveDns::spawn(AP_ADDR.into()).ok();
        info!("WiFi(sim): AP '{}' up", ssid);
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        use std::sync::atomic::Ordering;
        self.state.connected.load(Ordering::SeqCst).then_some(-55)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
