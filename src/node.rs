//! The etcd cluster member type (spec §3 "Member (Node)").
//!
//! A `Node`'s `name` (`etcd-<id>`) doubles as the Mesos task id (spec §6
//! "Task identifier format"): the whole struct serializes into that string,
//! and parsing the string back must reproduce an equal `Node` (spec R1).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::err;
use crate::error::{Error, ErrorKind, Result};

/// Whether a member is joining a brand-new etcd cluster or an existing one.
/// The first member placed (`running` empty at compose time) is `New`;
/// every subsequent member is `Existing` (spec §4.5 step 6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    New,
    Existing,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::New => write!(f, "new"),
            JoinType::Existing => write!(f, "existing"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub host: String,
    pub peer_port: u32,
    pub client_port: u32,
    pub reseed_port: u32,
    pub join_type: JoinType,
    pub worker_id: String,
}

impl Node {
    pub fn new(
        instance_id: u64,
        host: String,
        peer_port: u32,
        client_port: u32,
        reseed_port: u32,
        join_type: JoinType,
        worker_id: String,
    ) -> Node {
        Node {
            name: format!("etcd-{}", instance_id),
            host,
            peer_port,
            client_port,
            reseed_port,
            join_type,
            worker_id,
        }
    }

    pub fn peer_url(&self) -> String {
        format!("http://{}:{}", self.host, self.peer_port)
    }

    pub fn client_url(&self) -> String {
        format!("http://{}:{}", self.host, self.client_port)
    }

    pub fn reseed_url(&self) -> String {
        format!("http://{}:{}", self.host, self.reseed_port)
    }

    /// Numeric suffix of `name` (`etcd-7` -> `7`), used to advance
    /// `highestInstanceID` (spec §3, §4.4 RUNNING branch).
    pub fn instance_id(&self) -> Result<u64> {
        match self.name.strip_prefix("etcd-") {
            Some(rest) => {
                err!(InvalidInput, try: rest.parse::<u64>(), "parsing instance id from {}", self.name)
            }
            None => err!(InvalidInput, desc: "malformed node name {}", self.name),
        }
    }
}

/// The task id is the node serialized as compact JSON: self-describing and
/// round-trippable, matching spec §6.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl FromStr for Node {
    type Err = Error;

    fn from_str(s: &str) -> Result<Node> {
        serde_json::from_str(s)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("parsing task id: {}", e)))
    }
}
