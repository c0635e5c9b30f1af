//! Cluster Model (spec §4.3, component C3) and Scheduler State (spec §3).
//!
//! Three disjoint maps keyed by member name, protected by one
//! readers-writer lock (spec §4.3: "Readers obtaining a snapshot must copy
//! the `running` map to release the lock promptly").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use crate::node::Node;

/// Scheduler state (spec §3). Only `Mutable` permits new placements.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    Mutable,
    Immutable,
}

pub struct SchedulerStateCell(AtomicU8);

impl SchedulerStateCell {
    pub fn new(initial: SchedulerState) -> SchedulerStateCell {
        SchedulerStateCell(AtomicU8::new(Self::encode(initial)))
    }

    fn encode(s: SchedulerState) -> u8 {
        match s {
            SchedulerState::Mutable => 1,
            SchedulerState::Immutable => 0,
        }
    }

    pub fn get(&self) -> SchedulerState {
        match self.0.load(Ordering::SeqCst) {
            1 => SchedulerState::Mutable,
            _ => SchedulerState::Immutable,
        }
    }

    pub fn set(&self, s: SchedulerState) {
        self.0.store(Self::encode(s), Ordering::SeqCst);
    }

    pub fn is_mutable(&self) -> bool {
        self.get() == SchedulerState::Mutable
    }
}

impl Default for SchedulerStateCell {
    fn default() -> Self {
        // Initial = Immutable (spec §3).
        SchedulerStateCell::new(SchedulerState::Immutable)
    }
}

#[derive(Default)]
struct Inner {
    pending: HashMap<String, ()>,
    running: HashMap<String, Node>,
    tasks: HashMap<String, String>,
    highest_instance_id: u64,
}

#[derive(Default)]
pub struct ClusterModel {
    inner: RwLock<Inner>,
}

impl ClusterModel {
    pub fn new() -> ClusterModel {
        ClusterModel::default()
    }

    /// Insert `name` into `pending`. Invariant I4 (at most one in flight) is
    /// enforced by the launcher's admission check, not here: the model
    /// itself just records state.
    pub fn insert_pending(&self, name: &str) {
        self.inner.write().expect("cluster model poisoned").pending.insert(name.to_string(), ());
    }

    pub fn pending_len(&self) -> usize {
        self.inner.read().expect("cluster model poisoned").pending.len()
    }

    pub fn clear_pending(&self, name: &str) {
        self.inner.write().expect("cluster model poisoned").pending.remove(name);
    }

    /// Promote `name` into `running`/`tasks` if not already running
    /// (idempotent under duplicate RUNNING, spec R2), and advance
    /// `highestInstanceID` above its numeric suffix.
    pub fn mark_running(&self, node: Node, task_id: String) {
        let instance_id = node.instance_id().ok();
        let mut inner = self.inner.write().expect("cluster model poisoned");
        inner.pending.remove(&node.name);
        if !inner.running.contains_key(&node.name) {
            inner.tasks.insert(node.name.clone(), task_id);
            inner.running.insert(node.name.clone(), node);
        }
        if let Some(id) = instance_id {
            if id >= inner.highest_instance_id {
                inner.highest_instance_id = id + 1;
            }
        }
    }

    /// Remove `name` from `running` and `tasks` (terminal status, spec
    /// §4.4). Always clears `pending` too: a terminal status for a member
    /// that never made it past `pending` must still free the slot.
    pub fn remove(&self, name: &str) {
        let mut inner = self.inner.write().expect("cluster model poisoned");
        inner.pending.remove(name);
        inner.running.remove(name);
        inner.tasks.remove(name);
    }

    pub fn running_snapshot(&self) -> HashMap<String, Node> {
        self.inner.read().expect("cluster model poisoned").running.clone()
    }

    pub fn running_len(&self) -> usize {
        self.inner.read().expect("cluster model poisoned").running.len()
    }

    pub fn task_id_of(&self, name: &str) -> Option<String> {
        self.inner.read().expect("cluster model poisoned").tasks.get(name).cloned()
    }

    pub fn is_running_empty(&self) -> bool {
        self.running_len() == 0
    }

    /// Allocate the next instance id and reserve the name, without yet
    /// inserting into `pending` (caller does that once the launch is
    /// composed, spec §4.5 step 6-7).
    pub fn next_instance_id(&self) -> u64 {
        let mut inner = self.inner.write().expect("cluster model poisoned");
        let id = inner.highest_instance_id;
        inner.highest_instance_id += 1;
        id
    }

    /// Advance `highestInstanceID` above any name observed during
    /// reconciliation (spec §3 invariant), without otherwise touching the
    /// model.
    pub fn observe_instance_id(&self, id: u64) {
        let mut inner = self.inner.write().expect("cluster model poisoned");
        if id >= inner.highest_instance_id {
            inner.highest_instance_id = id + 1;
        }
    }

    /// Reset `running` to empty (spec §4.4 Registered); it will be rebuilt
    /// via reconciliation.
    pub fn reset_running(&self) {
        let mut inner = self.inner.write().expect("cluster model poisoned");
        inner.running.clear();
        inner.tasks.clear();
    }

    #[cfg(test)]
    pub fn invariant_pending_running_disjoint(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.pending.keys().all(|k| !inner.running.contains_key(k))
    }

    #[cfg(test)]
    pub fn invariant_running_has_task(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.running.keys().all(|k| inner.tasks.contains_key(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::JoinType;

    fn node(id: u64) -> Node {
        Node::new(id, "h".into(), 1, 2, 3, JoinType::Existing, "w".into())
    }

    #[test]
    fn duplicate_running_is_idempotent() {
        let model = ClusterModel::new();
        let n = node(1);
        model.mark_running(n.clone(), "task-1".into());
        model.mark_running(n.clone(), "task-1-dup".into());
        assert_eq!(model.running_len(), 1);
        // first write wins; duplicate does not clobber the task id.
        assert_eq!(model.task_id_of(&n.name), Some("task-1".to_string()));
    }

    #[test]
    fn pending_running_disjoint_invariant() {
        let model = ClusterModel::new();
        model.insert_pending("etcd-1");
        assert!(model.invariant_pending_running_disjoint());
        model.mark_running(node(1), "t".into());
        assert!(model.invariant_pending_running_disjoint());
        assert!(model.invariant_running_has_task());
    }

    #[test]
    fn highest_instance_id_monotonic() {
        let model = ClusterModel::new();
        assert_eq!(model.next_instance_id(), 0);
        model.observe_instance_id(5);
        assert_eq!(model.next_instance_id(), 6);
        model.observe_instance_id(2); // stale observation never rewinds it
        assert_eq!(model.next_instance_id(), 7);
    }

    #[test]
    fn terminal_status_clears_all_three_maps() {
        let model = ClusterModel::new();
        let n = node(9);
        model.mark_running(n.clone(), "t9".into());
        model.remove(&n.name);
        assert!(model.is_running_empty());
        assert_eq!(model.task_id_of(&n.name), None);
        assert_eq!(model.pending_len(), 0);
    }

    #[test]
    fn scheduler_state_defaults_immutable() {
        let cell = SchedulerStateCell::default();
        assert_eq!(cell.get(), SchedulerState::Immutable);
        cell.set(SchedulerState::Mutable);
        assert!(cell.is_mutable());
    }
}
