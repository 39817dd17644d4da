use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::run::RunId;

/// Env var naming the run this scheduler process executes under.
pub const RUN_ID_ENV: &str = "RUN_ID";

/// Name of the lock shared by every scheduler that reads or claims run status.
pub const RUN_STATUS_LOCK: &str = "run-status";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Resolve the self run id from a raw env value. Absence is fatal.
pub fn self_run_id_from(value: Option<String>) -> Result<RunId, CoreError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(CoreError::MissingEnv(RUN_ID_ENV))
}

/// Read `RUN_ID` from the process environment.
pub fn self_run_id() -> Result<RunId, CoreError> {
    self_run_id_from(env::var(RUN_ID_ENV).ok())
}

// ── Queue config ──────────────────────────────────────────────

/// Immutable scheduler settings captured at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Spacing between drain bursts in poll mode.
    pub poll_interval: Duration,
    /// Drain once and exit instead of polling forever.
    pub run_once: bool,
    /// Dispatch even while other runs are running.
    pub ignore_running: bool,
    /// Bounded wait for the run-status lock.
    pub lock_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            run_once: false,
            ignore_running: false,
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }
}

impl QueueConfig {
    pub fn mode_label(&self) -> &'static str {
        if self.run_once { "run-once" } else { "poll" }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Queue config loaded:");
        tracing::info!("  mode:           {}", self.mode_label());
        tracing::info!("  poll_interval:  {}s", self.poll_interval.as_secs());
        tracing::info!("  ignore_running: {}", self.ignore_running);
        tracing::info!("  lock_timeout:   {}s", self.lock_timeout.as_secs());
    }
}

// ── Home layout ───────────────────────────────────────────────

/// Root directory shared by cooperating schedulers: runs and lock files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunqHome {
    pub root: PathBuf,
}

impl RunqHome {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `~/.runq`, or `./.runq` when no home directory is known.
    pub fn default_location() -> Self {
        let root = dirs::home_dir()
            .map(|h| h.join(".runq"))
            .unwrap_or_else(|| PathBuf::from(".runq"));
        Self { root }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn lock_file(&self, name: &str) -> PathBuf {
        self.locks_dir().join(name)
    }

    /// Default location of the optional launcher config file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("queue.toml")
    }
}
