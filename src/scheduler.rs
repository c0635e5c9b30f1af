//! The scheduler aggregate and Event Handler (spec §4.4, component C4).
//!
//! Per spec §9 "Global mutable state", this crate models the scheduler as
//! one owned aggregate (`Scheduler`) rather than module-level statics: the
//! cluster model behind a readers-writer lock, counters as atomics, and
//! everything else wired together here. All the methods in this file run
//! on the event thread (spec §5) and must never block beyond the lock and
//! the non-blocking signal sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::cluster_model::{ClusterModel, SchedulerState, SchedulerStateCell};
use crate::config::Config;
use crate::coordination::CoordinationStore;
use crate::driver::{FrameworkId, MasterInfo, SchedulerDriver, StatusState, StatusUpdate};
use crate::etcd_client::EtcdClient;
use crate::node::Node;
use crate::offer::{Offer, OfferCache};
use crate::reseed_flag::ReseedFlag;
use crate::signals::LaunchSignals;
use crate::stats::Stats;

pub struct Scheduler {
    pub config: Config,
    pub model: ClusterModel,
    pub state: SchedulerStateCell,
    pub stats: Stats,
    pub offers: OfferCache,
    pub etcd: EtcdClient,
    pub driver: Arc<dyn SchedulerDriver>,
    pub coord: Arc<dyn CoordinationStore>,
    pub signals: LaunchSignals,
    pub reseed_flag: ReseedFlag,
    pub framework_id: Mutex<Option<String>>,
    pub shutdown: AtomicBool,
    /// The coarse lock spec §4.5 requires around the launcher's
    /// prune->admit->compose->insert sequence, shared with every writer of
    /// `state` (here, reseed, and the launcher's re-check) so a concurrent
    /// state flip can never land between an admission re-check and the
    /// resulting launch decision (invariant I5). Never held across the
    /// actual driver call.
    pub launch_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        driver: Arc<dyn SchedulerDriver>,
        coord: Arc<dyn CoordinationStore>,
    ) -> Scheduler {
        let capacity = config.desired_cluster_size;
        let single_instance = config.single_instance_per_worker;
        Scheduler {
            model: ClusterModel::new(),
            state: SchedulerStateCell::default(),
            stats: Stats::default(),
            offers: OfferCache::new(capacity, single_instance),
            etcd: EtcdClient::new(),
            driver,
            coord,
            signals: LaunchSignals::new(),
            reseed_flag: ReseedFlag::new(),
            framework_id: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            launch_lock: Mutex::new(()),
            config,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// `Registered(frameworkId, masterInfo)` (spec §4.4). Persists the
    /// framework id (benign if already present), resets `running` (it will
    /// be rebuilt via reconciliation), and starts the reconciler.
    pub fn on_registered(self: &Arc<Self>, framework_id: FrameworkId, _master_info: MasterInfo) {
        let path = self.config.framework_id_path();
        if let Err(e) = self.coord.persist_framework_id(&path, &framework_id.0) {
            log::error!("failed to persist framework id: {}", e);
        }
        *self.framework_id.lock().expect("framework id lock poisoned") = Some(framework_id.0);
        self.model.reset_running();

        let this = Arc::clone(self);
        thread::Builder::new()
            .name("reconciler".to_string())
            .spawn(move || crate::reconciler::run(this))
            .expect("failed to spawn reconciler thread");
    }

    /// `Reregistered(masterInfo)`: same as Registered, without re-persist.
    pub fn on_reregistered(self: &Arc<Self>, _master_info: MasterInfo) {
        self.model.reset_running();
        let this = Arc::clone(self);
        thread::Builder::new()
            .name("reconciler".to_string())
            .spawn(move || crate::reconciler::run(this))
            .expect("failed to spawn reconciler thread");
    }

    /// `Disconnected`: state = Immutable. Takes the coarse launch lock so
    /// this can never land between the launcher's re-check and its launch
    /// decision (spec §4.5, invariant I5).
    pub fn on_disconnected(&self) {
        let _guard = self.launch_lock.lock().expect("launch lock poisoned");
        self.state.set(SchedulerState::Immutable);
    }

    /// `ResourceOffers(offers)` (spec §4.4).
    pub fn on_resource_offers(self: &Arc<Self>, offers: Vec<Offer>) {
        for offer in offers {
            self.handle_one_offer(offer);
        }
    }

    fn handle_one_offer(self: &Arc<Self>, offer: Offer) {
        if !self.state.is_mutable() {
            self.decline(&offer.id);
            return;
        }
        if self.config.single_instance_per_worker && self.worker_already_running(&offer.worker_id)
        {
            self.decline(&offer.id);
            return;
        }
        let ports_needed = 3;
        if !offer.satisfies(
            self.config.task_cpus,
            self.config.task_mem_mb,
            self.config.task_disk_mb,
            ports_needed,
        ) {
            self.decline(&offer.id);
            return;
        }

        let offer_id = offer.id.clone();
        if !self.offers.push(offer) {
            self.decline(&offer_id);
            return;
        }

        let this = Arc::clone(self);
        let expire_after = Duration::from_secs(self.config.chill_seconds) / 2;
        thread::Builder::new()
            .name("offer-expiry".to_string())
            .spawn(move || {
                thread::sleep(expire_after);
                if this.offers.rescind(&offer_id) {
                    this.decline(&offer_id);
                }
            })
            .expect("failed to spawn offer-expiry thread");

        self.signals.signal_launch();
    }

    fn worker_already_running(&self, worker_id: &str) -> bool {
        self.model.running_snapshot().values().any(|n| n.worker_id == worker_id)
    }

    fn decline(&self, offer_id: &str) {
        if let Err(e) = self.driver.decline_offer(offer_id, self.config.refuse_seconds()) {
            log::warn!("decline_offer({}) failed: {}", offer_id, e);
        }
    }

    /// `StatusUpdate(status)` (spec §4.4).
    pub fn on_status_update(&self, status: StatusUpdate) {
        let node: Option<Node> = status.task_id.parse().ok();
        let name = node.as_ref().map(|n| n.name.clone()).unwrap_or_else(|| status.task_id.clone());
        self.model.clear_pending(&name);

        if status.state.is_terminal() {
            self.stats.incr_failed_tasks();
            self.signals.signal_pause();
            self.model.remove(&name);
            self.signals.signal_launch();
        } else if status.state == StatusState::Running {
            match node {
                Some(node) => self.model.mark_running(node, status.task_id.clone()),
                None => log::warn!("RUNNING status with malformed task id {}", status.task_id),
            }
        } else {
            log::debug!("ignoring status {:?} for {}", status.state, status.task_id);
        }

        self.stats.set_running_members(self.model.running_len() as u64);

        if self.model.is_running_empty() {
            let _guard = self.launch_lock.lock().expect("launch lock poisoned");
            self.state.set(SchedulerState::Immutable);
            log::error!("TOTAL CLUSTER LOSS: running set is empty, operator intervention required");
        }
    }

    /// `OfferRescinded(id)`.
    pub fn on_offer_rescinded(&self, offer_id: &str) {
        self.offers.rescind(offer_id);
    }

    /// `Error(msg)` (spec §4.4). A completed-framework re-registration is
    /// catastrophic (spec §7 class 4): clear the persisted identity and end
    /// the process with a non-zero exit code.
    pub fn on_error(&self, msg: &str) {
        if msg.to_lowercase().contains("completed framework attempted to re-register") {
            let path = self.config.framework_id_path();
            if let Err(e) = self.coord.clear_framework_id(&path) {
                log::error!("failed to clear framework id on completed-framework error: {}", e);
            }
            log::error!("fatal: {}", msg);
            std::process::exit(1);
        }
        log::error!("scheduler error: {}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;
    use crate::node::JoinType;
    use crate::offer::PortRange;

    fn scheduler() -> Arc<Scheduler> {
        let config = Config { desired_cluster_size: 2, ..Config::default() };
        let dir = std::env::temp_dir().join(format!("etcd-mesos-sched-test-{:?}", thread::current().id()));
        let coord = Arc::new(crate::coordination::FileCoordinationStore::new(dir));
        Arc::new(Scheduler::new(config, Arc::new(NullDriver), coord))
    }

    fn offer(id: &str, worker: &str) -> Offer {
        Offer {
            id: id.into(),
            worker_id: worker.into(),
            host: "10.0.0.1".into(),
            cpus: 4.0,
            mem_mb: 4096.0,
            disk_mb: 8192.0,
            port_ranges: vec![PortRange { begin: 31000, end: 31010 }],
        }
    }

    #[test]
    fn offers_declined_while_immutable() {
        let sched = scheduler();
        assert!(!sched.state.is_mutable());
        sched.on_resource_offers(vec![offer("o1", "w1")]);
        // Declined, not cached: Immutable state never admits to the cache.
        assert_eq!(sched.offers.len(), 0);
    }

    #[test]
    fn adequate_offer_is_cached_once_mutable() {
        let sched = scheduler();
        sched.state.set(SchedulerState::Mutable);
        sched.on_resource_offers(vec![offer("o1", "w1")]);
        assert_eq!(sched.offers.len(), 1);
    }

    #[test]
    fn status_running_promotes_and_advances_instance_id() {
        let sched = scheduler();
        let node = Node::new(4, "h".into(), 1, 2, 3, JoinType::Existing, "w1".into());
        sched.model.insert_pending(&node.name);
        sched.on_status_update(StatusUpdate { task_id: node.to_string(), state: StatusState::Running });
        assert_eq!(sched.model.running_len(), 1);
        assert_eq!(sched.model.pending_len(), 0);
        assert_eq!(sched.model.next_instance_id(), 5);
    }

    #[test]
    fn terminal_status_forces_immutable_when_running_becomes_empty() {
        let sched = scheduler();
        let node = Node::new(1, "h".into(), 1, 2, 3, JoinType::New, "w1".into());
        sched.on_status_update(StatusUpdate { task_id: node.to_string(), state: StatusState::Running });
        sched.state.set(SchedulerState::Mutable);
        sched.on_status_update(StatusUpdate { task_id: node.to_string(), state: StatusState::Failed });
        assert!(sched.model.is_running_empty());
        assert_eq!(sched.state.get(), SchedulerState::Immutable);
    }

    #[test]
    fn single_instance_per_worker_declines_second_offer_same_worker() {
        let sched = scheduler();
        sched.state.set(SchedulerState::Mutable);
        let node = Node::new(1, "h".into(), 1, 2, 3, JoinType::New, "w1".into());
        sched.on_status_update(StatusUpdate { task_id: node.to_string(), state: StatusState::Running });
        sched.on_resource_offers(vec![offer("o2", "w1")]);
        assert_eq!(sched.offers.len(), 0, "second offer on a worker already hosting a member must be declined");
    }
}
