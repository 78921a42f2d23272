//! Shared hardware bus guard.
//!
//! More than one worker may need the sensor bus (periodic acquisition,
//! on-demand diagnostics), so every transaction goes through [`BusGuard`]:
//! acquire with a short timeout, transact, release. The returned
//! [`BusHandle`] releases on drop, so the bus is returned on every exit
//! path including early returns and panics during a transaction.
//!
//! A failed acquisition (timeout) must be treated by the caller exactly
//! like a failed hardware transaction: mark the cycle failed and wait for
//! the next scheduled cycle — never block indefinitely and never retry
//! within the same cycle.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Exclusive-access wrapper around a single shared bus `B`.
///
/// At most one [`BusHandle`] exists at any instant.
pub struct BusGuard<B> {
    slot: Mutex<Option<B>>,
    returned: Condvar,
}

impl<B> BusGuard<B> {
    pub fn new(bus: B) -> Self {
        Self {
            slot: Mutex::new(Some(bus)),
            returned: Condvar::new(),
        }
    }

    /// Acquire exclusive access, waiting up to `timeout` for the current
    /// holder to release. Returns `None` on timeout.
    pub fn acquire(&self, timeout: Duration) -> Option<BusHandle<'_, B>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(bus) = slot.take() {
                return Some(BusHandle {
                    owner: self,
                    bus: Some(bus),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .returned
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    /// True if no handle is currently held.
    pub fn is_free(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Exclusive-access token. Dereferences to the bus; releases on drop.
pub struct BusHandle<'a, B> {
    owner: &'a BusGuard<B>,
    bus: Option<B>,
}

impl<B> Deref for BusHandle<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        // Invariant: `bus` is Some until drop.
        self.bus.as_ref().expect("bus handle already released")
    }
}

impl<B> DerefMut for BusHandle<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.bus.as_mut().expect("bus handle already released")
    }
}

impl<B> Drop for BusHandle<'_, B> {
    fn drop(&mut self) {
        let mut slot = self
            .owner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = self.bus.take();
        self.owner.returned.notify_one();
    }
}
