//! MQTT broker adapter.
//!
//! Implements [`BrokerPort`] over the ESP-IDF MQTT client. Inbound
//! messages are queued as raw `(topic, payload)` pairs from the client's
//! event callback; translation into commands happens in the core, never
//! inside the callback (nothing beyond enqueueing runs on the event path).
//!
//! The simulation backend scripts broker reachability and records every
//! publish, with a [`SimBrokerHandle`] for external control from tests.

use log::{info, warn};

use crate::error::CommsError;
use crate::ports::{BrokerPort, InboundMessage};

/// Depth of the raw inbound queue between the event callback and the
/// network worker.
#[allow(dead_code)]
const INBOUND_DEPTH: usize = 8;

fn make_inbound(topic: &str, payload: &[u8]) -> Option<InboundMessage> {
    let mut t = heapless::String::new();
    t.push_str(topic).ok()?;
    let mut p = heapless::Vec::new();
    p.extend_from_slice(payload).ok()?;
    Some(InboundMessage {
        topic: t,
        payload: p,
    })
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use super::*;
    use core::time::Duration;
    use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Shared between the client callback and the adapter.
    #[derive(Default)]
    struct Shared {
        connected: AtomicBool,
        inbound: Mutex<heapless::Deque<InboundMessage, INBOUND_DEPTH>>,
    }

    pub struct MqttBroker {
        host: heapless::String<64>,
        port: u16,
        client: Option<EspMqttClient<'static>>,
        shared: Arc<Shared>,
    }

    impl MqttBroker {
        pub fn new(host: &str, port: u16) -> Self {
            let mut h = heapless::String::new();
            let _ = h.push_str(host);
            Self {
                host: h,
                port,
                client: None,
                shared: Arc::new(Shared::default()),
            }
        }
    }

    impl BrokerPort for MqttBroker {
        fn connect(&mut self, client_id: &str) -> bool {
            let mut url = heapless::String::<96>::new();
            use core::fmt::Write;
            let _ = write!(url, "mqtt://{}:{}", self.host, self.port);

            let conf = MqttClientConfiguration {
                client_id: Some(client_id),
                ..Default::default()
            };

            let shared = Arc::clone(&self.shared);
            let client = EspMqttClient::new_cb(url.as_str(), &conf, move |event| {
                match event.payload() {
                    EventPayload::Connected(_) => {
                        shared.connected.store(true, Ordering::SeqCst);
                    }
                    EventPayload::Disconnected => {
                        shared.connected.store(false, Ordering::SeqCst);
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        ..
                    } => {
                        if let Some(msg) = make_inbound(topic, data) {
                            let mut queue = shared
                                .inbound
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner);
                            if queue.push_back(msg).is_err() {
                                warn!("MQTT: inbound queue full, message dropped");
                            }
                        }
                    }
                    _ => {}
                }
            });

            match client {
                Ok(c) => {
                    self.client = Some(c);
                    // Single bounded wait for the session to come up; the
                    // state machine treats a miss as a failed attempt and
                    // retries on a later tick.
                    for _ in 0..50 {
                        if self.shared.connected.load(Ordering::SeqCst) {
                            info!("MQTT: connected to {}:{}", self.host, self.port);
                            return true;
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    warn!("MQTT: connect timed out");
                    self.client = None;
                    false
                }
                Err(e) => {
                    warn!("MQTT: client init failed: {e}");
                    false
                }
            }
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
            let client = self.client.as_mut().ok_or(CommsError::SubscribeFailed)?;
            client
                .subscribe(topic, QoS::AtLeastOnce)
                .map(|_| ())
                .map_err(|_| CommsError::SubscribeFailed)
        }

        fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError> {
            let client = self.client.as_mut().ok_or(CommsError::PublishFailed)?;
            client
                .publish(topic, QoS::AtMostOnce, retain, payload)
                .map(|_| ())
                .map_err(|_| CommsError::PublishFailed)
        }

        fn poll(&mut self) {
            // Keep-alive and dispatch run on the client's own task; the
            // callback has already queued anything received.
        }

        fn is_connected(&self) -> bool {
            self.shared.connected.load(Ordering::SeqCst)
        }

        fn take_inbound(&mut self) -> Option<InboundMessage> {
            self.shared
                .inbound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::MqttBroker;

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Default)]
    pub(super) struct SimState {
        pub reachable: AtomicBool,
        pub connected: AtomicBool,
        pub connect_attempts: AtomicU32,
        pub inbound: Mutex<VecDeque<InboundMessage>>,
        pub published: Mutex<Vec<(String, Vec<u8>, bool)>>,
        pub subscriptions: Mutex<Vec<String>>,
    }

    /// External control of a simulated broker.
    #[derive(Clone)]
    pub struct SimBrokerHandle(pub(super) Arc<SimState>);

    impl SimBrokerHandle {
        /// Make future connection attempts succeed or fail.
        pub fn set_reachable(&self, reachable: bool) {
            self.0.reachable.store(reachable, Ordering::SeqCst);
        }

        /// Kill the current session (future attempts follow reachability).
        pub fn drop_session(&self) {
            self.0.connected.store(false, Ordering::SeqCst);
        }

        /// Inject an inbound message as if received from the server.
        pub fn inject(&self, topic: &str, payload: &[u8]) {
            if let Some(msg) = make_inbound(topic, payload) {
                self.0
                    .inbound
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(msg);
            }
        }

        pub fn connect_attempts(&self) -> u32 {
            self.0.connect_attempts.load(Ordering::SeqCst)
        }

        pub fn subscriptions(&self) -> Vec<String> {
            self.0
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// All publishes so far as `(topic, payload, retain)`.
        pub fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
            self.0
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Publishes whose topic ends with `suffix`.
        pub fn published_on(&self, suffix: &str) -> Vec<(String, Vec<u8>, bool)> {
            self.published()
                .into_iter()
                .filter(|(t, _, _)| t.ends_with(suffix))
                .collect()
        }
    }

    pub struct MqttBroker {
        state: Arc<SimState>,
    }

    impl MqttBroker {
        /// A broker that accepts connections.
        pub fn reachable() -> Self {
            let state = Arc::new(SimState::default());
            state.reachable.store(true, Ordering::SeqCst);
            Self { state }
        }

        /// A broker that refuses every connection attempt.
        pub fn unreachable() -> Self {
            Self {
                state: Arc::new(SimState::default()),
            }
        }

        pub fn handle(&self) -> SimBrokerHandle {
            SimBrokerHandle(Arc::clone(&self.state))
        }
    }

    impl BrokerPort for MqttBroker {
        fn connect(&mut self, client_id: &str) -> bool {
            self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
            let ok = self.state.reachable.load(Ordering::SeqCst);
            self.state.connected.store(ok, Ordering::SeqCst);
            if ok {
                info!("MQTT(sim): '{client_id}' connected");
            } else {
                warn!("MQTT(sim): connect refused");
            }
            ok
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
            if !self.is_connected() {
                return Err(CommsError::SubscribeFailed);
            }
            self.state
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(topic.to_string());
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError> {
            if !self.is_connected() {
                return Err(CommsError::PublishFailed);
            }
            self.state
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((topic.to_string(), payload.to_vec(), retain));
            Ok(())
        }

        fn poll(&mut self) {}

        fn is_connected(&self) -> bool {
            self.state.connected.load(Ordering::SeqCst)
        }

        fn take_inbound(&mut self) -> Option<InboundMessage> {
            if !self.is_connected() {
                return None;
            }
            self.state
                .inbound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{MqttBroker, SimBrokerHandle};

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn reachable_broker_accepts_and_records() {
        let mut broker = MqttBroker::reachable();
        let handle = broker.handle();
        assert!(broker.connect("NL-AABBCC"));
        broker.subscribe("devices/NL-AABBCC/cmd").unwrap();
        broker
            .publish("devices/NL-AABBCC/status", b"{}", true)
            .unwrap();

        assert_eq!(handle.connect_attempts(), 1);
        assert_eq!(handle.subscriptions(), vec!["devices/NL-AABBCC/cmd"]);
        let published = handle.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].2);
    }

    #[test]
    fn unreachable_broker_refuses() {
        let mut broker = MqttBroker::unreachable();
        assert!(!broker.connect("NL-AABBCC"));
        assert!(!broker.is_connected());
        assert!(broker.publish("t", b"{}", false).is_err());
    }

    #[test]
    fn injected_messages_arrive_in_order() {
        let mut broker = MqttBroker::reachable();
        let handle = broker.handle();
        assert!(broker.connect("id"));
        handle.inject("devices/id/cmd", b"one");
        handle.inject("devices/id/cmd", b"two");

        assert_eq!(broker.take_inbound().unwrap().payload.as_slice(), b"one");
        assert_eq!(broker.take_inbound().unwrap().payload.as_slice(), b"two");
        assert!(broker.take_inbound().is_none());
    }

    #[test]
    fn dropped_session_reports_disconnected() {
        let mut broker = MqttBroker::reachable();
        let handle = broker.handle();
        assert!(broker.connect("id"));
        handle.drop_session();
        assert!(!broker.is_connected());
        // Reachability unchanged: the next attempt succeeds.
        assert!(broker.connect("id"));
    }
}
