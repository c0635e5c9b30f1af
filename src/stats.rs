//! Monotonic counters (spec §3 "Stats"), updated with atomic arithmetic and
//! readable without the cluster-model lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Stats {
    pub running_members: AtomicU64,
    pub launches_attempted: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub livelock_events: AtomicU64,
    pub reseeds: AtomicU64,
    pub healthy: AtomicBool,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub running_members: u64,
    pub launches_attempted: u64,
    pub failed_tasks: u64,
    pub livelock_events: u64,
    pub reseeds: u64,
    pub healthy: bool,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            running_members: self.running_members.load(Ordering::Relaxed),
            launches_attempted: self.launches_attempted.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            livelock_events: self.livelock_events.load(Ordering::Relaxed),
            reseeds: self.reseeds.load(Ordering::Relaxed),
            healthy: self.healthy.load(Ordering::Relaxed),
        }
    }

    pub fn set_running_members(&self, n: u64) {
        self.running_members.store(n, Ordering::Relaxed);
    }

    pub fn incr_launches_attempted(&self) {
        self.launches_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_failed_tasks(&self) {
        self.failed_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_livelock_events(&self) {
        self.livelock_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_reseeds(&self) {
        self.reseeds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}
