//! Serial Launcher (spec §4.5, component C5).
//!
//! A single worker thread that performs one placement at a time: prune,
//! admission check, offer selection, compose, launch. Because launches are
//! serialized and each inserts into `pending`, and `shouldLaunch` requires
//! `pending` empty, there is at most one concurrent add-member operation
//! against etcd at any time (spec §4.5 "At-most-one-in-flight invariant",
//! invariant I4).

use std::sync::Arc;
use std::time::Duration;

use crate::driver::TaskInfo;
use crate::node::{JoinType, Node};
use crate::offer::Offer;
use crate::scheduler::Scheduler;

pub fn run(scheduler: Arc<Scheduler>) {
    let chill = Duration::from_secs(scheduler.config.chill_seconds);
    loop {
        if scheduler.is_shutdown() {
            break;
        }

        // Step 1: drain all pending pause signals; settle for each.
        let drained = scheduler.signals.drain_pauses();
        for _ in 0..drained {
            std::thread::sleep(chill);
        }

        // Step 2: wait for either channel. Pause has strict priority.
        let was_pause = scheduler.signals.wait_any();
        if was_pause {
            std::thread::sleep(chill);
            continue;
        }

        launch_one(&scheduler);
        std::thread::sleep(chill);
    }
}

fn launch_one(scheduler: &Arc<Scheduler>) {
    prune(scheduler);

    let running = scheduler.model.running_snapshot();
    let running_list: Vec<Node> = running.values().cloned().collect();

    let healthy = !running_list.is_empty() && scheduler.etcd.health_check(&running_list);

    if running_list.is_empty() {
        // Nothing to health-check against yet: bootstrap case, proceed to
        // the admission gate directly (it only demands health when
        // `running` is non-empty in practice, since an empty etcd cluster
        // cannot be queried).
        scheduler.reseed_flag.note_healthy();
        scheduler.stats.set_healthy(true);
    } else if healthy {
        scheduler.reseed_flag.note_healthy();
        scheduler.stats.set_healthy(true);
    } else {
        scheduler.stats.set_healthy(false);
        scheduler.stats.incr_livelock_events();
        let age = scheduler.reseed_flag.note_unhealthy();
        let timeout = Duration::from_secs(scheduler.config.reseed_timeout_seconds);
        if age >= timeout {
            crate::reseed::run(Arc::clone(scheduler));
        }
        return;
    }

    if !should_launch(scheduler, &running_list) {
        return;
    }

    let offer = match select_offer(scheduler) {
        Some(offer) => offer,
        None => return, // shutting down mid-selection
    };

    // Step 5: re-check shouldLaunch against the freshest view, holding the
    // coarse lock (spec §4.5) from here through `insert_pending` so a
    // concurrent state flip (Disconnected, forced-Immutable, reseed) can
    // never land between this check and the launch decision (invariant
    // I5). Released before the driver call, which the spec explicitly
    // keeps outside the lock since the driver may synchronously deliver
    // the next status update.
    let guard = scheduler.launch_lock.lock().expect("launch lock poisoned");
    let running2 = scheduler.model.running_snapshot();
    let running_list2: Vec<Node> = running2.values().cloned().collect();
    if !should_launch(scheduler, &running_list2) {
        drop(guard);
        decline(scheduler, &offer.id);
        return;
    }

    let composed = match compose(scheduler, &offer, running_list2) {
        Some(composed) => composed,
        None => {
            // Re-validated already, but guard against a stale offer.
            drop(guard);
            decline(scheduler, &offer.id);
            return;
        }
    };
    scheduler.model.insert_pending(&composed.node.name);
    scheduler.stats.incr_launches_attempted();
    drop(guard);

    launch(scheduler, offer, composed);
}

fn prune(scheduler: &Scheduler) {
    let running = scheduler.model.running_snapshot();
    if running.is_empty() {
        return;
    }
    let running_list: Vec<Node> = running.values().cloned().collect();
    let members = match scheduler.etcd.member_list(&running_list) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("prune: member_list failed, skipping this pass: {}", e);
            return;
        }
    };
    // Per-pass semantics preserved deliberately (spec §9 open question):
    // remove at most one unknown member per call, leaving the rest for the
    // next pass.
    if let Some(name) = members.keys().find(|name| !running.contains_key(*name)) {
        match scheduler.etcd.remove_member(&running_list, name) {
            Ok(()) => log::info!("pruned unknown etcd member {}", name),
            Err(e) => log::warn!("failed to prune unknown member {}: {}", name, e),
        }
    }
}

/// `shouldLaunch` (spec §4.5 step 2).
fn should_launch(scheduler: &Scheduler, running_list: &[Node]) -> bool {
    if !scheduler.state.is_mutable() {
        return false;
    }
    if scheduler.reseed_flag.is_underway() {
        return false;
    }
    if scheduler.model.pending_len() != 0 {
        return false;
    }
    if running_list.len() >= scheduler.config.desired_cluster_size {
        return false;
    }
    if running_list.is_empty() {
        return true; // bootstrap: nothing to ask etcd about yet.
    }
    if !scheduler.etcd.health_check(running_list) {
        return false;
    }
    match scheduler.etcd.member_list(running_list) {
        Ok(members) if members.len() == scheduler.config.desired_cluster_size => false,
        Ok(_) => true,
        Err(_) => false, // model inconsistency: never guess, wait for the next pass.
    }
}

fn select_offer(scheduler: &Arc<Scheduler>) -> Option<Offer> {
    loop {
        if scheduler.is_shutdown() {
            return None;
        }
        let candidate = scheduler.offers.blocking_pop();
        if offer_is_valid(scheduler, &candidate) {
            return Some(candidate);
        }
        decline(scheduler, &candidate.id);
    }
}

fn offer_is_valid(scheduler: &Scheduler, offer: &Offer) -> bool {
    if scheduler.config.single_instance_per_worker {
        let running = scheduler.model.running_snapshot();
        if running.values().any(|n| n.worker_id == offer.worker_id) {
            return false;
        }
    }
    true
}

fn decline(scheduler: &Scheduler, offer_id: &str) {
    if let Err(e) = scheduler.driver.decline_offer(offer_id, scheduler.config.refuse_seconds()) {
        log::warn!("decline_offer({}) failed: {}", offer_id, e);
    }
}

/// The member descriptor and task payload composed for one launch, computed
/// under the coarse lock (spec §4.5 step 6) but not yet handed to the
/// driver.
struct Composed {
    node: Node,
    task: TaskInfo,
}

/// Step 6: allocate ports from the offer's first sufficient range and
/// compose the member descriptor and task payload. Pure (no model mutation,
/// no driver call) so it can run inside the coarse lock alongside
/// `insert_pending` while the actual driver call (step 7) runs outside it.
fn compose(scheduler: &Scheduler, offer: &Offer, running: Vec<Node>) -> Option<Composed> {
    let range = offer.first_range_with(3)?;
    let peer_port = range.begin;
    let client_port = peer_port + 1;
    let reseed_port = peer_port + 2;

    let join_type = if running.is_empty() { JoinType::New } else { JoinType::Existing };
    let instance_id = scheduler.model.next_instance_id();
    let new_node = Node::new(
        instance_id,
        offer.host.clone(),
        peer_port,
        client_port,
        reseed_port,
        join_type,
        offer.worker_id.clone(),
    );

    let mut proposed_members = running;
    proposed_members.push(new_node.clone());

    let task = TaskInfo {
        task_id: new_node.to_string(),
        offer_id: offer.id.clone(),
        worker_id: offer.worker_id.clone(),
        cpus: scheduler.config.task_cpus,
        mem_mb: scheduler.config.task_mem_mb,
        disk_mb: scheduler.config.task_disk_mb,
        port_begin: peer_port,
        port_count: 3,
        proposed_members,
    };

    Some(Composed { node: new_node, task })
}

/// Step 7: hand the composed task to the driver, outside the coarse lock
/// (spec §4.5: "performed outside the lock because the driver may
/// synchronously deliver the next status update").
fn launch(scheduler: &Scheduler, offer: Offer, composed: Composed) {
    let Composed { node, task } = composed;
    match scheduler.driver.launch_tasks(&[offer.id.clone()], vec![task]) {
        Ok(()) => log::info!("launched {} (join={})", node.name, node.join_type),
        Err(e) => {
            log::error!("launch_tasks failed for {}: {}", node.name, e);
            scheduler.model.clear_pending(&node.name);
        }
    }
}
