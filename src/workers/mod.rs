//! Worker loops.
//!
//! Each worker is an infinite loop with its own poll/sleep cadence,
//! scheduled preemptively (one FreeRTOS-backed thread per worker on the
//! device). Workers exchange data exclusively through the bounded channels
//! and read connectivity through [`ConnectionState`](crate::conn::ConnectionState);
//! there is no other shared mutable state between them.
//!
//! | Worker      | Cadence          | Role                                  |
//! |-------------|------------------|---------------------------------------|
//! | `acquire`   | 1 s cycle        | sensor read → telemetry channel       |
//! | `actuate`   | 100 ms poll      | command channel → outputs/indicator   |
//! | `indicator` | 500 ms refresh   | connection state → status colour      |
//!
//! The network worker lives in [`crate::net`].

pub mod acquire;
pub mod actuate;
pub mod indicator;
