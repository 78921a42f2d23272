//! Host-side integration tests.
//!
//! Drive the real workers against the simulation adapter backends —
//! scripted WiFi link, in-memory broker, in-memory outputs — and assert
//! on the externally observable behaviour: published payloads, output
//! states, and connection flags.

#![cfg(not(target_os = "espidf"))]

mod mock_ports;
mod pipeline_tests;
mod state_machine_tests;
