//! Launch/pause signals (spec §4.5, §5).
//!
//! Bounded at 2048 entries with non-blocking send: the event thread must
//! never stall on a slow launcher (spec §5 "Shared state"). Overflow is
//! logged, never propagated as an error that would block the caller.
//!
//! Backed by a `Mutex`-guarded pair of counters plus one `Condvar`, the same
//! pattern `OfferCache` (`src/offer.rs`) uses for its blocking pop: a plain
//! `mpsc::Receiver::recv` can't give the launcher "pause has strict priority
//! over launch" without first peeking both queues, so this follows
//! `OfferCache`'s precedent of reaching for `Condvar` once a raw channel recv
//! can't express the required check, rather than polling on a timer.

use std::sync::{Condvar, Mutex};

pub const SIGNAL_CHAN_CAPACITY: usize = 2048;

#[derive(Default)]
struct Counts {
    pauses: usize,
    launches: usize,
}

pub struct LaunchSignals {
    inner: Mutex<Counts>,
    available: Condvar,
}

impl Default for LaunchSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchSignals {
    pub fn new() -> LaunchSignals {
        LaunchSignals { inner: Mutex::new(Counts::default()), available: Condvar::new() }
    }

    pub fn signal_launch(&self) {
        let mut inner = self.inner.lock().expect("launch signals poisoned");
        if inner.pauses + inner.launches >= SIGNAL_CHAN_CAPACITY {
            log::warn!("launch signal queue full, dropping wakeup");
            return;
        }
        inner.launches += 1;
        self.available.notify_one();
    }

    pub fn signal_pause(&self) {
        let mut inner = self.inner.lock().expect("launch signals poisoned");
        if inner.pauses + inner.launches >= SIGNAL_CHAN_CAPACITY {
            log::warn!("pause signal queue full, dropping wakeup");
            return;
        }
        inner.pauses += 1;
        self.available.notify_one();
    }

    /// Drain all pending pause signals without blocking. Returns the count
    /// drained (spec §4.5 step 1: "Drain all pending pause signals").
    pub fn drain_pauses(&self) -> usize {
        let mut inner = self.inner.lock().expect("launch signals poisoned");
        let n = inner.pauses;
        inner.pauses = 0;
        n
    }

    pub fn try_recv_pause(&self) -> bool {
        let mut inner = self.inner.lock().expect("launch signals poisoned");
        if inner.pauses > 0 {
            inner.pauses -= 1;
            true
        } else {
            false
        }
    }

    pub fn try_recv_launch(&self) -> bool {
        let mut inner = self.inner.lock().expect("launch signals poisoned");
        if inner.launches > 0 {
            inner.launches -= 1;
            true
        } else {
            false
        }
    }

    /// Block until a pause or launch is pending; pause has strict priority
    /// (spec §4.5, §5 "Ordering guarantees"). Returns `true` if it was a
    /// pause, `false` if a launch. A genuine `Condvar::wait`, not a polling
    /// loop: the launcher parks here for real between wakeups.
    pub fn wait_any(&self) -> bool {
        let mut inner = self.inner.lock().expect("launch signals poisoned");
        loop {
            if inner.pauses > 0 {
                inner.pauses -= 1;
                return true;
            }
            if inner.launches > 0 {
                inner.launches -= 1;
                return false;
            }
            inner = self.available.wait(inner).expect("launch signals poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_has_priority_over_launch() {
        let signals = LaunchSignals::new();
        signals.signal_launch();
        signals.signal_pause();
        assert!(signals.wait_any());
        // The launch signalled first is still queued behind the pause we
        // just consumed.
        assert!(signals.try_recv_launch());
    }

    #[test]
    fn drain_pauses_counts_and_empties() {
        let signals = LaunchSignals::new();
        signals.signal_pause();
        signals.signal_pause();
        assert_eq!(signals.drain_pauses(), 2);
        assert_eq!(signals.drain_pauses(), 0);
    }

    #[test]
    fn wait_any_blocks_until_signalled() {
        use std::sync::Arc;
        use std::time::Duration;

        let signals = Arc::new(LaunchSignals::new());
        let waiter = Arc::clone(&signals);
        let handle = std::thread::spawn(move || waiter.wait_any());

        std::thread::sleep(Duration::from_millis(50));
        signals.signal_launch();
        assert!(!handle.join().expect("waiter thread panicked"));
    }
}
