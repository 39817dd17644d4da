use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use runq_core::config::{DEFAULT_LOCK_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS};
use runq_core::{QueueConfig, RunqHome};

/// Staged-run queue scheduler.
///
/// Launches staged runs one at a time, coordinating with sibling
/// schedulers through the shared run-status lock. Must be started with
/// `RUN_ID` set to the run the scheduler itself executes under.
#[derive(Parser, Debug)]
#[command(name = "runq-queue", version, about = "Launch staged runs one at a time")]
pub struct CliArgs {
    /// Seconds between drain bursts in poll mode
    #[arg(long, env = "RUNQ_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,

    /// Drain currently staged runs once and exit
    #[arg(long, env = "RUNQ_RUN_ONCE")]
    pub run_once: bool,

    /// Start staged runs even while other runs are running
    #[arg(long, env = "RUNQ_IGNORE_RUNNING")]
    pub ignore_running: bool,

    /// Seconds to wait for the run-status lock before skipping a cycle
    #[arg(long, env = "RUNQ_LOCK_TIMEOUT", default_value_t = DEFAULT_LOCK_TIMEOUT_SECS)]
    pub lock_timeout: u64,

    /// Root directory holding runs and lock files (default: ~/.runq)
    #[arg(long, env = "RUNQ_HOME")]
    pub home: Option<PathBuf>,

    /// Launcher config file (default: <home>/queue.toml)
    #[arg(long, env = "RUNQ_CONFIG")]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            run_once: self.run_once,
            ignore_running: self.ignore_running,
            lock_timeout: Duration::from_secs(self.lock_timeout),
        }
    }

    pub fn home(&self) -> RunqHome {
        match &self.home {
            Some(root) => RunqHome::new(root),
            None => RunqHome::default_location(),
        }
    }
}
