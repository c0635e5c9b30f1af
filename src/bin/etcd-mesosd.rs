//! CLI entry point (SPEC_FULL §4.8). Parses a config file, validates it,
//! wires up the scheduler aggregate, and spawns the worker threads: the
//! serial launcher, the periodic requestor, and the admin HTTP surface.
//! Mirrors the teacher's `mqttd` binary: `structopt` for flags, `env_logger`
//! for output, `ctrlc` for graceful shutdown.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use structopt::StructOpt;

use etcd_mesos::config::Config;
use etcd_mesos::coordination::FileCoordinationStore;
use etcd_mesos::driver::NullDriver;
use etcd_mesos::Scheduler;

#[derive(StructOpt, Debug)]
#[structopt(name = "etcd-mesosd", about = "Mesos scheduler that keeps an etcd cluster alive")]
struct Opt {
    /// Path to the TOML configuration file.
    #[structopt(short, long, parse(from_os_str))]
    config: PathBuf,

    /// Validate the configuration and exit without starting any threads.
    #[structopt(long)]
    dry_run: bool,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let raw = match std::fs::read_to_string(&opt.config) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("failed to read {}: {}", opt.config.display(), e);
            std::process::exit(1);
        }
    };

    let config = match Config::from_toml_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to parse {}: {}", opt.config.display(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("invalid configuration: {}", e);
        std::process::exit(1);
    }

    if opt.dry_run {
        println!("configuration OK: {:#?}", config);
        return;
    }

    // The real Mesos driver is an external collaborator (spec §6); this
    // binary ships only the null driver today, sufficient for a standalone
    // or dry-run deployment. A production wiring plugs a Mesos-speaking
    // `SchedulerDriver` implementation in here instead.
    let coord_root = std::env::temp_dir().join("etcd-mesos-coordination");
    let coord = Arc::new(FileCoordinationStore::new(coord_root));
    let scheduler = Arc::new(Scheduler::new(config, Arc::new(NullDriver), coord));

    let launcher_sched = Arc::clone(&scheduler);
    let launcher_handle = std::thread::Builder::new()
        .name("launcher".to_string())
        .spawn(move || etcd_mesos::launcher::run(launcher_sched))
        .expect("failed to spawn launcher thread");

    let periodic_sched = Arc::clone(&scheduler);
    std::thread::Builder::new()
        .name("periodic".to_string())
        .spawn(move || etcd_mesos::periodic::run(periodic_sched))
        .expect("failed to spawn periodic requestor thread");

    let shutdown_sched = Arc::clone(&scheduler);
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("received shutdown signal");
        shutdown_sched.shutdown.store(true, Ordering::SeqCst);
    }) {
        log::warn!("failed to install ctrl-c handler: {}", e);
    }

    let admin_sched = Arc::clone(&scheduler);
    if let Err(e) = etcd_mesos::admin::run(admin_sched) {
        log::error!("admin server exited: {}", e);
    }

    let _ = launcher_handle.join();
}
