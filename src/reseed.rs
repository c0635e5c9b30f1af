//! Reseed Controller (spec §4.6, component C6).
//!
//! Triggered from the launcher once health has failed continuously for
//! `reseedTimeout` (spec §4.5 step 3). A single-shot task guarded by the
//! reseed flag's compare-and-set (invariant I6: two concurrent reseed
//! attempts never both proceed past the gate).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cluster_model::SchedulerState;
use crate::node::Node;
use crate::scheduler::Scheduler;

pub fn run(scheduler: Arc<Scheduler>) {
    if !scheduler.config.auto_reseed {
        log::warn!("reseed condition met but auto_reseed is disabled; surfacing condition only");
        return;
    }
    if !scheduler.reseed_flag.try_begin() {
        log::debug!("reseed already underway, skipping re-entrant trigger");
        return;
    }

    scheduler.stats.incr_reseeds();

    let running = scheduler.model.running_snapshot();
    let running_list: Vec<Node> = running.values().cloned().collect();
    let candidates = scheduler.etcd.rank_reseed_candidates(&running_list);

    if candidates.is_empty() {
        scheduler.driver.abort("reseed: no surviving candidates, cluster is irrecoverable");
    }

    // Immutability during reseed prevents a launch from racing the kills
    // below (spec §4.6 rationale). Shares the launcher's coarse lock (spec
    // §4.5) so this transition can never land between the launcher's
    // admission re-check and its launch decision (invariant I5).
    {
        let _guard = scheduler.launch_lock.lock().expect("launch lock poisoned");
        scheduler.state.set(SchedulerState::Immutable);
    }

    let timeout = Duration::from_secs(scheduler.config.reseed_timeout_seconds);
    let mut seed: Option<Node> = None;
    let mut killable: Vec<Node> = Vec::new();

    for candidate in candidates {
        if seed.is_some() {
            killable.push(candidate);
            continue;
        }
        match scheduler.etcd.trigger_reseed(&candidate) {
            Ok(()) => {
                if wait_until_healthy(&scheduler, &candidate, timeout) {
                    log::info!("reseed: {} is the new seed", candidate.name);
                    seed = Some(candidate);
                } else {
                    log::warn!("reseed: {} did not become healthy in time", candidate.name);
                    killable.push(candidate);
                }
            }
            Err(e) => {
                log::warn!("reseed: triggering {} failed: {}", candidate.name, e);
                killable.push(candidate);
            }
        }
    }

    for node in &killable {
        if let Some(task_id) = scheduler.model.task_id_of(&node.name) {
            if let Err(e) = scheduler.driver.kill_task(&task_id) {
                log::warn!("reseed: kill_task({}) failed: {}", node.name, e);
            }
        }
    }

    scheduler.reseed_flag.clear();
    {
        let _guard = scheduler.launch_lock.lock().expect("launch lock poisoned");
        scheduler.state.set(SchedulerState::Mutable);
    }
}

fn wait_until_healthy(scheduler: &Scheduler, node: &Node, timeout: Duration) -> bool {
    let start = Instant::now();
    let mut delay = Duration::from_millis(500);
    let cap = Duration::from_secs(8);
    while start.elapsed() < timeout {
        if scheduler.etcd.health_check(std::slice::from_ref(node)) {
            return true;
        }
        std::thread::sleep(delay.min(cap));
        delay = (delay * 2).min(cap);
    }
    false
}
