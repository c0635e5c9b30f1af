//! etcd RPC Client (spec §4.2, component C2).
//!
//! Every call is bounded to a 5s per-request timeout and retried with
//! exponential backoff capped at 8s, 5 attempts total (spec §4.2, §7 class
//! 1 "Transient"). Blocking `ureq` keeps this client on the same
//! synchronous footing as the rest of the crate's thread-per-worker design.
//!
//! `EtcdClient` talks to etcd only through the `EtcdTransport` seam below,
//! the same way `Scheduler` talks to the resource manager only through
//! `SchedulerDriver` and to the coordination store only through
//! `CoordinationStore`: so the retry/parsing/quorum logic here can be
//! exercised against a fake transport in tests instead of a live etcd.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::err;
use crate::error::{ErrorKind, Result};
use crate::node::Node;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_CAP: Duration = Duration::from_secs(8);

fn backoff_delay(attempt: u32) -> Duration {
    let millis = 500u64.saturating_mul(1u64 << attempt.min(5));
    Duration::from_millis(millis).min(BACKOFF_CAP)
}

/// Retry `f` up to `MAX_ATTEMPTS` times with exponential backoff, returning
/// the last error if every attempt fails.
fn with_retry<T>(op: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) => {
                log::warn!("{} attempt {}/{} failed: {}", op, attempt + 1, MAX_ATTEMPTS, e);
                last_err = Some(e);
                if attempt + 1 < MAX_ATTEMPTS {
                    thread::sleep(backoff_delay(attempt));
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt runs"))
}

#[derive(Deserialize)]
struct MemberListResponse {
    members: Vec<MemberEntry>,
}

#[derive(Deserialize)]
struct MemberEntry {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct SelfStats {
    #[serde(rename = "raftIndex")]
    raft_index: u64,
}

/// The HTTP seam `EtcdClient` depends on. One GET/POST/DELETE per call,
/// response body returned as a string for the caller to parse; transport
/// errors (connect/timeout/non-2xx) come back as `Err`.
pub trait EtcdTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<String>;
    fn post(&self, url: &str, body: String) -> Result<String>;
    fn delete(&self, url: &str) -> Result<String>;
}

/// The real transport, backed by a blocking `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        UreqTransport::new()
    }
}

impl UreqTransport {
    pub fn new() -> UreqTransport {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(REQUEST_TIMEOUT)
            .timeout_read(REQUEST_TIMEOUT)
            .timeout_write(REQUEST_TIMEOUT)
            .build();
        UreqTransport { agent }
    }
}

impl EtcdTransport for UreqTransport {
    fn get(&self, url: &str) -> Result<String> {
        let resp = err!(RpcFail, try: self.agent.get(url).timeout(REQUEST_TIMEOUT).call(), "GET {}", url)?;
        err!(RpcFail, try: resp.into_string(), "reading GET {} body", url)
    }

    fn post(&self, url: &str, body: String) -> Result<String> {
        let resp = err!(RpcFail, try: self.agent.post(url).timeout(REQUEST_TIMEOUT).send_string(&body), "POST {}", url)?;
        err!(RpcFail, try: resp.into_string(), "reading POST {} body", url)
    }

    fn delete(&self, url: &str) -> Result<String> {
        let resp = err!(RpcFail, try: self.agent.delete(url).timeout(REQUEST_TIMEOUT).call(), "DELETE {}", url)?;
        err!(RpcFail, try: resp.into_string(), "reading DELETE {} body", url)
    }
}

pub struct EtcdClient {
    transport: Arc<dyn EtcdTransport>,
}

impl Default for EtcdClient {
    fn default() -> Self {
        EtcdClient::new()
    }
}

impl EtcdClient {
    pub fn new() -> EtcdClient {
        EtcdClient { transport: Arc::new(UreqTransport::new()) }
    }

    /// Build a client against a caller-supplied transport (tests, or an
    /// alternate HTTP stack), bypassing `UreqTransport` entirely.
    pub fn with_transport(transport: Arc<dyn EtcdTransport>) -> EtcdClient {
        EtcdClient { transport }
    }

    /// `MemberList(running) -> name->id`; an empty list is treated as
    /// failure and retried (spec §4.2).
    pub fn member_list(&self, running: &[Node]) -> Result<HashMap<String, String>> {
        with_retry("member_list", || self.member_list_once(running))
    }

    fn member_list_once(&self, running: &[Node]) -> Result<HashMap<String, String>> {
        for node in running {
            let url = format!("{}/v2/members", node.client_url());
            let body = match self.transport.get(&url) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let parsed: MemberListResponse = match serde_json::from_str(&body) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if parsed.members.is_empty() {
                continue;
            }
            return Ok(parsed.members.into_iter().map(|m| (m.name, m.id)).collect());
        }
        err!(RpcFail, desc: "member_list: no reachable member returned a non-empty list")
    }

    /// `HealthCheck(running)`: true iff enough members respond to indicate
    /// quorum (a strict majority of the `running` set answers `/v2/members`).
    pub fn health_check(&self, running: &[Node]) -> bool {
        if running.is_empty() {
            return false;
        }
        let alive = running
            .iter()
            .filter(|n| {
                let url = format!("{}/v2/members", n.client_url());
                self.transport.get(&url).is_ok()
            })
            .count();
        alive * 2 > running.len()
    }

    /// `AddMember(running, new)`: precondition HealthCheck(running); POSTs
    /// the new peer URL to any running member, retrying across members.
    pub fn add_member(&self, running: &[Node], new: &Node) -> Result<()> {
        if !self.health_check(running) {
            return err!(Unhealthy, desc: "add_member: running cluster failed health check");
        }
        with_retry("add_member", || self.add_member_once(running, new))
    }

    fn add_member_once(&self, running: &[Node], new: &Node) -> Result<()> {
        let body = serde_json::json!({ "peerURLs": [new.peer_url()] }).to_string();
        for node in running {
            let url = format!("{}/v2/members", node.client_url());
            if self.transport.post(&url, body.clone()).is_ok() {
                return Ok(());
            }
        }
        err!(RpcFail, desc: "add_member: exhausted all running members")
    }

    /// `RemoveMember(running, name)`: look up the etcd-assigned id via
    /// MemberList, then DELETE against any member other than the target.
    pub fn remove_member(&self, running: &[Node], name: &str) -> Result<()> {
        with_retry("remove_member", || self.remove_member_once(running, name))
    }

    fn remove_member_once(&self, running: &[Node], name: &str) -> Result<()> {
        let ids = self.member_list_once(running)?;
        let id = match ids.get(name) {
            Some(id) => id.clone(),
            None => return err!(RpcFail, desc: "remove_member: {} not found in member list", name),
        };
        for node in running.iter().filter(|n| n.name != name) {
            let url = format!("{}/v2/members/{}", node.client_url(), id);
            if let Ok(body) = self.transport.delete(&url) {
                if body.starts_with("Member permanently removed") {
                    return Ok(());
                }
            }
        }
        err!(RpcFail, desc: "remove_member: no member accepted the delete for {}", name)
    }

    /// `TriggerReseed(node)`: instructs the node's local executor, via its
    /// reseed HTTP port, to restart etcd with force-new-cluster.
    pub fn trigger_reseed(&self, node: &Node) -> Result<()> {
        let url = format!("{}/force-new-cluster", node.reseed_url());
        self.transport.post(&url, String::new())?;
        Ok(())
    }

    fn raft_index(&self, node: &Node) -> Option<u64> {
        let url = format!("{}/v2/stats/self", node.client_url());
        let body = self.transport.get(&url).ok()?;
        let stats: SelfStats = serde_json::from_str(&body).ok()?;
        Some(stats.raft_index)
    }

    /// `RankReseedCandidates(running) -> list`: highest Raft index first,
    /// ties broken deterministically by name, unreachable members excluded.
    pub fn rank_reseed_candidates(&self, running: &[Node]) -> Vec<Node> {
        let mut ranked: Vec<(u64, Node)> = running
            .iter()
            .filter_map(|n| self.raft_index(n).map(|idx| (idx, n.clone())))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        ranked.into_iter().map(|(_, n)| n).collect()
    }
}

/// A fake `EtcdTransport` keyed by exact URL, for exercising `EtcdClient`'s
/// retry/parsing/quorum logic (and callers that build their own `EtcdClient`
/// for tests, e.g. `launcher`/`reseed`) without a live etcd cluster.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Responses are keyed by (verb, url): GET and POST against the same
    /// `/v2/members` URL (health-check vs. add-member) are distinct calls
    /// and must be configurable independently.
    #[derive(Default)]
    pub struct FakeTransport {
        responses: Mutex<HashMap<(String, String), Result<String>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeTransport {
        pub fn new() -> FakeTransport {
            FakeTransport::default()
        }

        /// Configure (or replace) the canned response for `verb` + `url`.
        pub fn set(&self, verb: &str, url: &str, response: Result<String>) {
            self.responses
                .lock()
                .expect("fake transport poisoned")
                .insert((verb.to_string(), url.to_string()), response);
        }

        pub fn call_count(&self, verb: &str, url: &str) -> usize {
            self.calls
                .lock()
                .expect("fake transport poisoned")
                .iter()
                .filter(|(v, u)| v == verb && u == url)
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().expect("fake transport poisoned").len()
        }

        fn respond(&self, verb: &str, url: &str) -> Result<String> {
            self.calls.lock().expect("fake transport poisoned").push((verb.to_string(), url.to_string()));
            match self.responses.lock().expect("fake transport poisoned").get(&(verb.to_string(), url.to_string()))
            {
                Some(r) => r.clone(),
                None => err!(RpcFail, desc: "fake transport: no response configured for {} {}", verb, url),
            }
        }
    }

    impl EtcdTransport for FakeTransport {
        fn get(&self, url: &str) -> Result<String> {
            self.respond("GET", url)
        }

        fn post(&self, url: &str, _body: String) -> Result<String> {
            self.respond("POST", url)
        }

        fn delete(&self, url: &str) -> Result<String> {
            self.respond("DELETE", url)
        }
    }
}
