//! Coordination-store client (spec §4.4, §6). The real backend (etcd or
//! ZooKeeper holding the framework identity across restarts) is an external
//! collaborator per spec §1; only the trait contract and a local-file
//! implementation for standalone/dev use are shipped here.

use std::fs;
use std::path::{Path, PathBuf};

use crate::err;
use crate::error::Result;

pub trait CoordinationStore: Send + Sync {
    /// Persist `id` at `path`. "Already present" is benign (spec §4.4
    /// Registered: "treat already-persisted as benign").
    fn persist_framework_id(&self, path: &str, id: &str) -> Result<()>;
    fn read_framework_id(&self, path: &str) -> Result<Option<String>>;
    fn clear_framework_id(&self, path: &str) -> Result<()>;
}

/// Stores the framework id as a file under `root`, at the path implied by
/// `Config::framework_id_path` (spec §6 "Persisted state").
pub struct FileCoordinationStore {
    root: PathBuf,
}

impl FileCoordinationStore {
    pub fn new(root: impl Into<PathBuf>) -> FileCoordinationStore {
        FileCoordinationStore { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl CoordinationStore for FileCoordinationStore {
    fn persist_framework_id(&self, path: &str, id: &str) -> Result<()> {
        let full = self.resolve(path);
        if let Some(existing) = self.read_framework_id(path)? {
            if existing == id {
                return Ok(());
            }
        }
        if let Some(parent) = full.parent() {
            err!(IOError, try: fs::create_dir_all(parent), "creating coordination store dir")?;
        }
        err!(IOError, try: fs::write(&full, id), "persisting framework id")
    }

    fn read_framework_id(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path);
        if !Path::new(&full).exists() {
            return Ok(None);
        }
        let content = err!(IOError, try: fs::read_to_string(&full), "reading framework id")?;
        Ok(Some(content))
    }

    fn clear_framework_id(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        if Path::new(&full).exists() {
            err!(IOError, try: fs::remove_file(&full), "clearing framework id")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_store() -> FileCoordinationStore {
        let dir = std::env::temp_dir().join(format!("etcd-mesos-test-{}", std::process::id()));
        FileCoordinationStore::new(dir)
    }

    #[test]
    fn persist_then_read_round_trips() {
        let store = tmp_store();
        let path = "/etcd-mesos/prod/framework-id";
        store.persist_framework_id(path, "fw-123").unwrap();
        assert_eq!(store.read_framework_id(path).unwrap(), Some("fw-123".to_string()));
        store.clear_framework_id(path).unwrap();
        assert_eq!(store.read_framework_id(path).unwrap(), None);
    }

    #[test]
    fn re_persisting_same_id_is_benign() {
        let store = tmp_store();
        let path = "/etcd-mesos/prod2/framework-id";
        store.persist_framework_id(path, "fw-1").unwrap();
        store.persist_framework_id(path, "fw-1").unwrap();
        assert_eq!(store.read_framework_id(path).unwrap(), Some("fw-1".to_string()));
        store.clear_framework_id(path).unwrap();
    }
}
