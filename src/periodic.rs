//! Periodic requestor (SPEC_FULL §4.13, component C13, `[SUPPLEMENT]`).
//!
//! A slow heartbeat independent of the offer-driven launch path: even if no
//! offer ever arrives to nudge the launcher awake, this thread notices the
//! cluster is short and signals a launch itself. Sleeps `5 * chillSeconds`
//! between checks, the same ratio the teacher's background maintenance
//! threads use relative to their own tick interval.

use std::sync::Arc;
use std::time::Duration;

use crate::scheduler::Scheduler;

pub fn run(scheduler: Arc<Scheduler>) {
    let interval = Duration::from_secs(5 * scheduler.config.chill_seconds);
    loop {
        std::thread::sleep(interval);
        if scheduler.is_shutdown() {
            return;
        }
        let running = scheduler.model.running_len();
        if running < scheduler.config.desired_cluster_size {
            log::debug!("periodic requestor: running={} desired={}, signaling launch", running, scheduler.config.desired_cluster_size);
            scheduler.signals.signal_launch();
        }
    }
}
