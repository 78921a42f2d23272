//! Indicator worker.
//!
//! Polls the connection state and renders a status colour. Priority order
//! mirrors the connectivity ladder: configuration mode wins, then a down
//! link, then a down broker, then fully online.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::command::Rgb;
use crate::config::NodeConfig;
use crate::conn::{ConnectionSnapshot, ConnectionState};
use crate::ports::IndicatorPort;

/// Orange — configuration access point active.
pub const COLOUR_CONFIG: Rgb = Rgb::new(255, 128, 0);
/// Red — attempting or missing link.
pub const COLOUR_LINK_DOWN: Rgb = Rgb::new(255, 0, 0);
/// Blue — link up, broker session down.
pub const COLOUR_BROKER_DOWN: Rgb = Rgb::new(0, 0, 255);
/// Green — link and broker up.
pub const COLOUR_ONLINE: Rgb = Rgb::new(0, 255, 0);

/// Map a connection snapshot to its status colour.
pub fn status_colour(snapshot: ConnectionSnapshot) -> Rgb {
    if snapshot.configuration_mode {
        COLOUR_CONFIG
    } else if !snapshot.link_up {
        COLOUR_LINK_DOWN
    } else if !snapshot.broker_up {
        COLOUR_BROKER_DOWN
    } else {
        COLOUR_ONLINE
    }
}

/// The indicator worker.
pub struct IndicatorWorker<I: IndicatorPort> {
    conn: Arc<ConnectionState>,
    indicator: I,
    interval: Duration,
}

impl<I: IndicatorPort> IndicatorWorker<I> {
    pub fn new(conn: Arc<ConnectionState>, indicator: I, config: &NodeConfig) -> Self {
        Self {
            conn,
            indicator,
            interval: Duration::from_millis(u64::from(config.indicator_interval_ms)),
        }
    }

    /// One refresh.
    pub fn cycle(&self) {
        self.indicator.set_rgb(status_colour(self.conn.snapshot()));
    }

    /// Run forever at the refresh cadence.
    pub fn run(self) -> ! {
        loop {
            self.cycle();
            thread::sleep(self.interval);
        }
    }
}
