//! Reconciler (spec §4.7, component C7).
//!
//! Runs once per (re)registration, driving task reconciliation until the
//! local cluster model agrees with the resource manager's view, then
//! flips state to Mutable. The abstract driver contract (spec §6) exposes
//! no separate "state endpoint" query — reconciliation results arrive the
//! same way any other status does, via `StatusUpdate` callbacks landing on
//! the event thread and updating `running` through the normal path. So
//! "poll the resource manager's state endpoint; compare count against
//! running" (spec §4.7) is realized here as: call `ReconcileTasks(empty)`,
//! then watch `running` for one `chill_seconds` interval without further
//! growth — convergence is the signal that every outstanding status has
//! landed. This choice is recorded in DESIGN.md.

use std::sync::Arc;
use std::time::Duration;

use crate::cluster_model::SchedulerState;
use crate::scheduler::Scheduler;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_CAP: Duration = Duration::from_secs(8);

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(1000u64.saturating_mul(1u64 << attempt.min(5))).min(BACKOFF_CAP)
}

pub fn run(scheduler: Arc<Scheduler>) {
    let chill = Duration::from_secs(scheduler.config.chill_seconds);

    for attempt in 0..MAX_ATTEMPTS {
        match scheduler.driver.reconcile_tasks(&[]) {
            Ok(()) => {
                std::thread::sleep(chill);
                let before = scheduler.model.running_len();
                std::thread::sleep(chill);
                let after = scheduler.model.running_len();
                if before == after {
                    scheduler.state.set(SchedulerState::Mutable);
                    log::info!("reconciliation converged with {} running members", after);
                    return;
                }
                log::debug!("reconciliation round {}: running grew {} -> {}", attempt + 1, before, after);
            }
            Err(e) => {
                log::warn!("reconcile_tasks attempt {}/{} failed: {}", attempt + 1, MAX_ATTEMPTS, e);
            }
        }
        std::thread::sleep(backoff_delay(attempt));
    }

    log::error!("reconciliation exhausted after {} rounds", MAX_ATTEMPTS);
    scheduler.driver.abort("reconciliation exhausted without reaching sync");
}

#[cfg(test)]
mod tests {
    use super::backoff_delay;
    use super::BACKOFF_CAP;

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..8 {
            assert!(backoff_delay(attempt) <= BACKOFF_CAP);
        }
    }
}
