//! The abstract resource-manager driver contract (spec §6). The concrete
//! Mesos driver (offer stream, task-launch RPC, reconcile RPC, status
//! stream) is an external collaborator per spec §1; this crate only
//! specifies the surface it consumes.

use crate::error::Result;
use crate::node::Node;

#[derive(Clone, Debug)]
pub struct FrameworkId(pub String);

#[derive(Clone, Debug, Default)]
pub struct MasterInfo {
    pub id: String,
    pub host: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusState {
    Running,
    Lost,
    Finished,
    Killed,
    Error,
    Failed,
    Staging,
    Starting,
}

impl StatusState {
    /// The terminal classification from spec §4.4: these five states
    /// remove a member from `running`/`tasks` and trigger pause+launch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusState::Lost
                | StatusState::Finished
                | StatusState::Killed
                | StatusState::Error
                | StatusState::Failed
        )
    }
}

#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub task_id: String,
    pub state: StatusState,
}

#[derive(Clone, Debug)]
pub struct TaskStatusQuery {
    pub task_id: String,
}

/// Per-task resource ask and the proposed member-list payload (spec §6
/// "Task payload (Data)").
#[derive(Clone, Debug)]
pub struct TaskInfo {
    pub task_id: String,
    pub offer_id: String,
    pub worker_id: String,
    pub cpus: f64,
    pub mem_mb: f64,
    pub disk_mb: f64,
    pub port_begin: u32,
    pub port_count: u32,
    pub proposed_members: Vec<Node>,
}

impl TaskInfo {
    /// JSON array of the proposed full member list; the executor reads this
    /// to launch etcd with the correct `--initial-cluster` /
    /// `--initial-cluster-state`.
    pub fn data(&self) -> Result<String> {
        use crate::err;
        err!(InvalidInput, try: serde_json::to_string(&self.proposed_members), "serializing task payload")
    }
}

/// The driver surface the core consumes (spec §6 "Driver contract
/// consumed"). `abort` never returns: a catastrophic condition (spec §7
/// class 4) ends the process.
pub trait SchedulerDriver: Send + Sync {
    fn reconcile_tasks(&self, tasks: &[TaskStatusQuery]) -> Result<()>;
    fn decline_offer(&self, offer_id: &str, refuse_seconds: f64) -> Result<()>;
    fn launch_tasks(&self, offer_ids: &[String], tasks: Vec<TaskInfo>) -> Result<()>;
    fn kill_task(&self, task_id: &str) -> Result<()>;
    fn abort(&self, reason: &str) -> !;
}

/// Logs every call instead of talking to a real master. Used by
/// `--dry-run` and by unit tests that exercise the scheduler logic without
/// a live Mesos cluster.
pub struct NullDriver;

impl SchedulerDriver for NullDriver {
    fn reconcile_tasks(&self, tasks: &[TaskStatusQuery]) -> Result<()> {
        log::info!("[null-driver] reconcile_tasks: {} tasks", tasks.len());
        Ok(())
    }

    fn decline_offer(&self, offer_id: &str, refuse_seconds: f64) -> Result<()> {
        log::debug!("[null-driver] decline_offer {} refuse_seconds={}", offer_id, refuse_seconds);
        Ok(())
    }

    fn launch_tasks(&self, offer_ids: &[String], tasks: Vec<TaskInfo>) -> Result<()> {
        log::info!("[null-driver] launch_tasks offers={:?} tasks={}", offer_ids, tasks.len());
        Ok(())
    }

    fn kill_task(&self, task_id: &str) -> Result<()> {
        log::info!("[null-driver] kill_task {}", task_id);
        Ok(())
    }

    fn abort(&self, reason: &str) -> ! {
        log::error!("[null-driver] abort: {}", reason);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::JoinType;

    #[test]
    fn terminal_states_classified() {
        assert!(StatusState::Lost.is_terminal());
        assert!(StatusState::Failed.is_terminal());
        assert!(!StatusState::Running.is_terminal());
        assert!(!StatusState::Staging.is_terminal());
    }

    #[test]
    fn task_payload_serializes_member_list() {
        let node = Node::new(1, "h".into(), 1, 2, 3, JoinType::New, "w".into());
        let task = TaskInfo {
            task_id: node.to_string(),
            offer_id: "o1".into(),
            worker_id: "w".into(),
            cpus: 1.0,
            mem_mb: 256.0,
            disk_mb: 1024.0,
            port_begin: 1,
            port_count: 3,
            proposed_members: vec![node],
        };
        let data = task.data().unwrap();
        assert!(data.starts_with('['));
        assert!(data.contains("etcd-1"));
    }
}
