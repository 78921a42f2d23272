//! Bounded inter-worker channels.
//!
//! A fixed-capacity FIFO queue with one of two overflow policies, fixed at
//! construction:
//!
//! - [`SendPolicy::BlockWithTimeout`] — the producer blocks up to the
//!   configured timeout when the channel is full; on timeout the send is
//!   abandoned and the item dropped. Used for command delivery, where
//!   commands must never be silently reordered or duplicated.
//! - [`SendPolicy::DropOldest`] — a full channel evicts exactly its oldest
//!   item to make room, so the newest item always lands. Used for
//!   telemetry, where only the latest environmental state matters.
//!
//! Channels are the only legal path for data transfer between workers.
//! FIFO order is preserved for all items that survive; `DropOldest` may
//! skip an item but never reorders survivors.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use heapless::Deque;

/// Overflow policy, fixed per channel at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Block the producer up to the given duration, then give up.
    BlockWithTimeout(Duration),
    /// Evict the oldest queued item to admit the new one.
    DropOldest,
}

/// How a successful send landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Item enqueued without displacing anything.
    Delivered,
    /// Channel was full; the oldest item was evicted first (`DropOldest`).
    DeliveredEvictedOldest,
}

/// Why a send did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// `BlockWithTimeout` producer waited out its timeout on a full channel.
    Timeout,
}

/// Fixed-capacity FIFO channel with a policy-governed `send`.
///
/// `N` is the capacity; `len() <= N` holds at all times.
pub struct BoundedChannel<T, const N: usize> {
    queue: Mutex<Deque<T, N>>,
    not_empty: Condvar,
    not_full: Condvar,
    policy: SendPolicy,
}

impl<T, const N: usize> BoundedChannel<T, N> {
    pub fn new(policy: SendPolicy) -> Self {
        Self {
            queue: Mutex::new(Deque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            policy,
        }
    }

    pub fn policy(&self) -> SendPolicy {
        self.policy
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    /// Enqueue according to the channel's policy.
    pub fn send(&self, item: T) -> Result<SendOutcome, SendError> {
        match self.policy {
            SendPolicy::BlockWithTimeout(timeout) => self.send_blocking(item, timeout),
            SendPolicy::DropOldest => Ok(self.send_drop_oldest(item)),
        }
    }

    /// Non-blocking enqueue; returns the item back when full.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        let mut q = self.lock_queue();
        match q.push_back(item) {
            Ok(()) => {
                self.not_empty.notify_one();
                Ok(())
            }
            Err(item) => Err(item),
        }
    }

    /// Dequeue the oldest item, waiting up to `timeout` for one to arrive.
    pub fn recv(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut q = self.lock_queue();
        loop {
            if let Some(item) = q.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(q, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            q = guard;
        }
    }

    /// Non-blocking dequeue.
    pub fn try_recv(&self) -> Option<T> {
        let item = self.lock_queue().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    // ── Internal ──────────────────────────────────────────────

    fn send_blocking(&self, item: T, timeout: Duration) -> Result<SendOutcome, SendError> {
        let deadline = Instant::now() + timeout;
        let mut q = self.lock_queue();
        loop {
            if !q.is_full() {
                // Cannot fail: the queue is not full and the lock is held.
                let _ = q.push_back(item);
                self.not_empty.notify_one();
                return Ok(SendOutcome::Delivered);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SendError::Timeout);
            }
            let (guard, _) = self
                .not_full
                .wait_timeout(q, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            q = guard;
        }
    }

    fn send_drop_oldest(&self, item: T) -> SendOutcome {
        let mut q = self.lock_queue();
        let outcome = if q.is_full() {
            // Evict exactly one oldest item. The lock spans eviction and
            // enqueue, so the insert always lands and survivors keep their
            // relative order.
            let _ = q.pop_front();
            SendOutcome::DeliveredEvictedOldest
        } else {
            SendOutcome::Delivered
        };
        let _ = q.push_back(item);
        self.not_empty.notify_one();
        outcome
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Deque<T, N>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ───────────────────────────────────────────────────────────────
// Channel instantiations
// ───────────────────────────────────────────────────────────────

/// Depth of the telemetry channel (acquisition worker → network worker).
pub const TELEMETRY_DEPTH: usize = 10;

/// Depth of the command channel (network worker → actuation worker).
pub const COMMAND_DEPTH: usize = 20;

/// Telemetry channel: `DropOldest`, so the newest sample always lands.
pub type TelemetryChannel = BoundedChannel<crate::telemetry::TelemetrySample, TELEMETRY_DEPTH>;

/// Command channel: `BlockWithTimeout`, so commands are never reordered
/// or duplicated; an overflowing send is dropped and counted instead.
pub type CommandChannel = BoundedChannel<crate::command::Command, COMMAND_DEPTH>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn fifo_order_preserved() {
        let ch: BoundedChannel<u32, 4> = BoundedChannel::new(SendPolicy::DropOldest);
        for i in 0..4 {
            assert_eq!(ch.send(i), Ok(SendOutcome::Delivered));
        }
        for i in 0..4 {
            assert_eq!(ch.recv(TIMEOUT), Some(i));
        }
        assert!(ch.is_empty());
    }

    #[test]
    fn drop_oldest_keeps_last_n_in_order() {
        // Capacity 10, sequence ids 1..=15 — channel must hold 6..=15.
        let ch: BoundedChannel<u32, 10> = BoundedChannel::new(SendPolicy::DropOldest);
        for i in 1..=15 {
            let outcome = ch.send(i).unwrap();
            if i <= 10 {
                assert_eq!(outcome, SendOutcome::Delivered);
            } else {
                assert_eq!(outcome, SendOutcome::DeliveredEvictedOldest);
            }
        }
        assert_eq!(ch.len(), 10);
        for i in 6..=15 {
            assert_eq!(ch.try_recv(), Some(i));
        }
        assert!(ch.is_empty());
    }

    #[test]
    fn drop_oldest_stays_at_capacity_once_saturated() {
        let ch: BoundedChannel<u32, 3> = BoundedChannel::new(SendPolicy::DropOldest);
        for i in 0..20 {
            let _ = ch.send(i);
            assert!(ch.len() <= 3);
        }
        assert_eq!(ch.len(), 3);
    }

    #[test]
    fn block_with_timeout_rejects_twenty_first() {
        // Capacity 20, 21 rapid sends with no consumer: first 20 land,
        // the 21st times out, the first 20 remain in order.
        let ch: BoundedChannel<u32, 20> =
            BoundedChannel::new(SendPolicy::BlockWithTimeout(Duration::from_millis(100)));
        for i in 0..20 {
            assert_eq!(ch.send(i), Ok(SendOutcome::Delivered));
        }
        let start = Instant::now();
        assert_eq!(ch.send(20), Err(SendError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(ch.len(), 20);
        for i in 0..20 {
            assert_eq!(ch.try_recv(), Some(i));
        }
    }

    #[test]
    fn blocked_sender_wakes_when_consumer_drains() {
        let ch: Arc<BoundedChannel<u32, 1>> = Arc::new(BoundedChannel::new(
            SendPolicy::BlockWithTimeout(Duration::from_secs(2)),
        ));
        ch.send(0).unwrap();

        let producer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.send(1))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ch.recv(TIMEOUT), Some(0));

        assert_eq!(producer.join().unwrap(), Ok(SendOutcome::Delivered));
        assert_eq!(ch.recv(TIMEOUT), Some(1));
    }

    #[test]
    fn recv_times_out_on_empty_channel() {
        let ch: BoundedChannel<u32, 4> = BoundedChannel::new(SendPolicy::DropOldest);
        let start = Instant::now();
        assert_eq!(ch.recv(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn recv_wakes_on_send_from_other_thread() {
        let ch: Arc<BoundedChannel<u32, 4>> =
            Arc::new(BoundedChannel::new(SendPolicy::DropOldest));
        let consumer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.recv(Duration::from_secs(2)))
        };
        thread::sleep(Duration::from_millis(50));
        ch.send(7).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn try_send_reports_full() {
        let ch: BoundedChannel<u32, 2> =
            BoundedChannel::new(SendPolicy::BlockWithTimeout(TIMEOUT));
        assert!(ch.try_send(1).is_ok());
        assert!(ch.try_send(2).is_ok());
        assert_eq!(ch.try_send(3), Err(3));
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let ch: BoundedChannel<u32, 5> = BoundedChannel::new(SendPolicy::DropOldest);
        for i in 0..100 {
            let _ = ch.send(i);
            assert!(ch.len() <= ch.capacity());
        }
    }
}
