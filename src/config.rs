//! Configuration (spec §4.8 / SPEC_FULL §4.8). A TOML file parsed with
//! `serde` + `toml`, every field defaulted so a one-line config is legal —
//! the same convention the teacher uses for `ConfigNode`.

use serde::{Deserialize, Serialize};

use crate::err;
use crate::error::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cluster_name: String,
    pub framework_name: String,
    pub desired_cluster_size: usize,
    pub single_instance_per_worker: bool,
    pub chill_seconds: u64,
    pub reseed_timeout_seconds: u64,
    pub auto_reseed: bool,
    pub task_cpus: f64,
    pub task_mem_mb: f64,
    pub task_disk_mb: f64,
    pub admin_addr: String,
    pub executor_uri: String,
    pub zk_path: String,
    pub principal: String,
    pub role: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            cluster_name: "etcd".to_string(),
            framework_name: "etcd-mesos".to_string(),
            desired_cluster_size: 3,
            single_instance_per_worker: true,
            chill_seconds: 10,
            reseed_timeout_seconds: 30,
            auto_reseed: true,
            task_cpus: 1.0,
            task_mem_mb: 256.0,
            task_disk_mb: 1024.0,
            admin_addr: "0.0.0.0:23400".to_string(),
            executor_uri: String::new(),
            zk_path: "/etcd-mesos".to_string(),
            principal: String::new(),
            role: "*".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config> {
        err!(InvalidInput, try: toml::from_str(s), "parsing config")
    }

    /// Rejects configurations that can never satisfy spec §4.5 step 6 (a
    /// launch needs three consecutive ports) or that disable growth
    /// entirely.
    pub fn validate(&self) -> Result<()> {
        if self.desired_cluster_size == 0 {
            return err!(InvalidInput, desc: "desired_cluster_size must be > 0");
        }
        if self.chill_seconds == 0 {
            return err!(InvalidInput, desc: "chill_seconds must be > 0");
        }
        if self.reseed_timeout_seconds == 0 {
            return err!(InvalidInput, desc: "reseed_timeout_seconds must be > 0");
        }
        if self.task_cpus <= 0.0 || self.task_mem_mb <= 0.0 || self.task_disk_mb <= 0.0 {
            return err!(InvalidInput, desc: "task resource requirements must be positive");
        }
        Ok(())
    }

    /// `refuseSeconds = 5 * chillSeconds` (spec §6 "Decline filter").
    pub fn refuse_seconds(&self) -> f64 {
        5.0 * self.chill_seconds as f64
    }

    pub fn framework_id_path(&self) -> String {
        format!("{}/{}/framework-id", self.zk_path, self.cluster_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg = Config::from_toml_str(r#"cluster_name = "prod""#).unwrap();
        assert_eq!(cfg.cluster_name, "prod");
        assert_eq!(cfg.desired_cluster_size, 3);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_desired_size() {
        let cfg = Config::from_toml_str("desired_cluster_size = 0").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn refuse_seconds_is_five_times_chill() {
        let mut cfg = Config::default();
        cfg.chill_seconds = 10;
        assert_eq!(cfg.refuse_seconds(), 50.0);
    }
}
