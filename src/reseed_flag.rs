//! Reseed State (spec §3): a compare-and-set gate plus the livelock window
//! timestamp. Kept as its own small module since both the launcher (which
//! reads it to decide `shouldLaunch`) and the reseed controller (which
//! owns the CAS) need shared, lock-light access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Default)]
pub struct ReseedFlag {
    underway: AtomicBool,
    livelock_window: Mutex<Option<Instant>>,
}

impl ReseedFlag {
    pub fn new() -> ReseedFlag {
        ReseedFlag::default()
    }

    pub fn is_underway(&self) -> bool {
        self.underway.load(Ordering::SeqCst)
    }

    /// Atomically transition NotReseeding -> ReseedUnderway. Returns `true`
    /// if this call won the gate (spec §4.6 "a compare-and-set on the
    /// reseed flag succeeds").
    pub fn try_begin(&self) -> bool {
        self.underway
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn clear(&self) {
        self.underway.store(false, Ordering::SeqCst);
        *self.livelock_window.lock().expect("reseed flag poisoned") = None;
    }

    /// Record the first consecutive unhealthy observation, if not already
    /// set. Returns the window's age.
    pub fn note_unhealthy(&self) -> std::time::Duration {
        let mut window = self.livelock_window.lock().expect("reseed flag poisoned");
        let start = *window.get_or_insert_with(Instant::now);
        start.elapsed()
    }

    /// Clear the livelock window on a successful health check.
    pub fn note_healthy(&self) {
        *self.livelock_window.lock().expect("reseed flag poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_gate_is_non_reentrant() {
        let flag = ReseedFlag::new();
        assert!(flag.try_begin());
        assert!(!flag.try_begin(), "second concurrent begin must be rejected");
        flag.clear();
        assert!(flag.try_begin());
    }

    #[test]
    fn livelock_window_latches_first_observation() {
        let flag = ReseedFlag::new();
        let first = flag.note_unhealthy();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = flag.note_unhealthy();
        assert!(second >= first);
        flag.note_healthy();
        let restarted = flag.note_unhealthy();
        assert!(restarted < second);
    }
}
