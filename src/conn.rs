//! Shared connection state.
//!
//! Three independently observable flags describe the node's connectivity:
//! configuration mode, link (station association), and broker session.
//! The network worker is the only writer; every other worker reads through
//! [`ConnectionState::snapshot`]. Each flag is a single atomic word, so
//! readers may observe a value that is stale by one tick but never a torn
//! update.
//!
//! The transition helpers encode the flag implications (`broker_up` requires
//! `link_up`; configuration mode excludes both), so an inconsistent
//! combination cannot be produced through this API.

use core::sync::atomic::{AtomicBool, Ordering};

/// Single-writer / multi-reader connection flags.
#[derive(Debug, Default)]
pub struct ConnectionState {
    configuration_mode: AtomicBool,
    link_up: AtomicBool,
    broker_up: AtomicBool,
}

/// A coherent-per-flag copy of the state for status rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub configuration_mode: bool,
    pub link_up: bool,
    pub broker_up: bool,
}

impl ConnectionState {
    /// All-false at boot.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Readers ───────────────────────────────────────────────

    pub fn configuration_mode(&self) -> bool {
        self.configuration_mode.load(Ordering::Acquire)
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn broker_up(&self) -> bool {
        self.broker_up.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            configuration_mode: self.configuration_mode(),
            link_up: self.link_up(),
            broker_up: self.broker_up(),
        }
    }

    // ── Writers (network worker and reset path only) ──────────

    /// Station association established.
    pub fn mark_link_up(&self) {
        self.configuration_mode.store(false, Ordering::Release);
        self.link_up.store(true, Ordering::Release);
    }

    /// Station association lost. Also clears the broker flag, since a
    /// broker session cannot outlive the link.
    pub fn mark_link_lost(&self) {
        self.broker_up.store(false, Ordering::Release);
        self.link_up.store(false, Ordering::Release);
    }

    /// Broker session established. Only meaningful while the link is up.
    pub fn mark_broker_up(&self) {
        debug_assert!(self.link_up(), "broker session without link");
        self.broker_up.store(true, Ordering::Release);
    }

    /// Broker session lost; the link may still be up.
    pub fn mark_broker_lost(&self) {
        self.broker_up.store(false, Ordering::Release);
    }

    /// Entered configuration mode (no managed link, or explicit reset).
    /// Forces `configuration_mode = true` and clears the rest.
    pub fn mark_config_mode(&self) {
        self.broker_up.store(false, Ordering::Release);
        self.link_up.store(false, Ordering::Release);
        self.configuration_mode.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_all_false() {
        let c = ConnectionState::new();
        let s = c.snapshot();
        assert!(!s.configuration_mode);
        assert!(!s.link_up);
        assert!(!s.broker_up);
    }

    #[test]
    fn link_up_clears_config_mode() {
        let c = ConnectionState::new();
        c.mark_config_mode();
        c.mark_link_up();
        assert!(c.link_up());
        assert!(!c.configuration_mode());
    }

    #[test]
    fn link_loss_clears_broker() {
        let c = ConnectionState::new();
        c.mark_link_up();
        c.mark_broker_up();
        assert!(c.broker_up());
        c.mark_link_lost();
        assert!(!c.link_up());
        assert!(!c.broker_up());
    }

    #[test]
    fn broker_loss_keeps_link() {
        let c = ConnectionState::new();
        c.mark_link_up();
        c.mark_broker_up();
        c.mark_broker_lost();
        assert!(c.link_up());
        assert!(!c.broker_up());
    }

    #[test]
    fn config_mode_clears_everything_else() {
        let c = ConnectionState::new();
        c.mark_link_up();
        c.mark_broker_up();
        c.mark_config_mode();
        let s = c.snapshot();
        assert!(s.configuration_mode);
        assert!(!s.link_up);
        assert!(!s.broker_up);
    }

    #[test]
    fn broker_implies_link_invariant_holds() {
        let c = ConnectionState::new();
        c.mark_link_up();
        c.mark_broker_up();
        let s = c.snapshot();
        assert!(!s.broker_up || s.link_up);
    }
}
