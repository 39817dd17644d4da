//! Queue controller: picks the next eligible staged run under the
//! run-status lock, claims it, and hands it to the launcher.

use std::collections::HashSet;

use tracing::{error, info, warn};

use runq_core::{describe_runs, CoreError, QueueConfig, Run, RunId};

use crate::error::{LaunchError, LockError, QueueError};
use crate::launcher::RunLauncher;
use crate::lock::RunLock;
use crate::repository::RunRepository;

/// Per-process scheduler bookkeeping. Never shared across processes.
#[derive(Debug, Clone)]
pub struct QueueState {
    self_run_id: RunId,
    config: QueueConfig,
    /// Staged runs already reported as blocked.
    waiting: HashSet<RunId>,
    /// A waiting or idle notice was logged for the current blocked period.
    logged_waiting: bool,
}

impl QueueState {
    pub fn new(self_run_id: impl Into<RunId>, config: QueueConfig) -> Self {
        Self {
            self_run_id: self_run_id.into(),
            config,
            waiting: HashSet::new(),
            logged_waiting: false,
        }
    }

    /// Build state for this process; fails when `RUN_ID` is unset.
    pub fn from_env(config: QueueConfig) -> Result<Self, CoreError> {
        Ok(Self::new(runq_core::config::self_run_id()?, config))
    }

    pub fn self_run_id(&self) -> &str {
        &self.self_run_id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn is_waiting(&self, run_id: &str) -> bool {
        self.waiting.contains(run_id)
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn logged_waiting(&self) -> bool {
        self.logged_waiting
    }

    /// Returns true the first time `run` is seen blocked in this period.
    fn note_waiting(&mut self, run: &Run, running: &[Run]) -> bool {
        if !self.waiting.insert(run.id.clone()) {
            return false;
        }
        info!(
            "Found staged run {} (waiting for runs to finish: {})",
            run.short_id(),
            describe_runs(running)
        );
        self.logged_waiting = true;
        true
    }

    fn reset_waiting(&mut self) {
        self.waiting.clear();
        self.logged_waiting = false;
    }
}

/// What happened during one drain burst.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurstReport {
    /// Runs handed to the launcher, in dispatch order (failed ones included).
    pub dispatched: Vec<RunId>,
    /// Runs that exited non-zero, with their exit codes.
    pub failed: Vec<(RunId, i32)>,
    /// Runs that became blocked during this burst.
    pub newly_waiting: Vec<RunId>,
    pub lock_timeouts: u32,
    /// The idle notice was logged at the end of this burst.
    pub idle_notice: bool,
}

impl BurstReport {
    pub fn is_idle(&self) -> bool {
        self.dispatched.is_empty()
    }
}

/// Drives selection and dispatch against injected lock, repository and launcher.
pub struct QueueController<L, R, X> {
    lock: L,
    repository: R,
    launcher: X,
}

impl<L, R, X> QueueController<L, R, X>
where
    L: RunLock,
    R: RunRepository,
    X: RunLauncher,
{
    pub fn new(lock: L, repository: R, launcher: X) -> Self {
        Self {
            lock,
            repository,
            launcher,
        }
    }

    pub fn lock(&self) -> &L {
        &self.lock
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn launcher(&self) -> &X {
        &self.launcher
    }

    /// Dispatch eligible staged runs until none is left, without sleeping.
    pub async fn drain(&self, state: &mut QueueState) -> Result<BurstReport, QueueError> {
        let mut report = BurstReport::default();

        while let Some(run) = self.safe_next_run(state, &mut report).await? {
            self.start_run(&run, state, &mut report).await?;
        }

        if report.is_idle() && !state.logged_waiting {
            if state.config.run_once {
                info!("No more staged runs, finishing");
            } else {
                info!("Waiting for staged runs");
            }
            state.logged_waiting = true;
            report.idle_notice = true;
        }
        Ok(report)
    }

    /// Select and claim the next run while holding the run-status lock.
    ///
    /// A lock timeout skips this cycle and yields `None`.
    pub async fn safe_next_run(
        &self,
        state: &mut QueueState,
        report: &mut BurstReport,
    ) -> Result<Option<Run>, QueueError> {
        let guard = match self.lock.acquire(state.config.lock_timeout).await {
            Ok(guard) => guard,
            Err(LockError::Timeout { lock_file, .. }) => {
                warn!(
                    "could not acquire lock for reading staged runs\n\
                     If this error persists, try stopping all queues and deleting {}",
                    lock_file.display()
                );
                report.lock_timeouts += 1;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let next = self.next_run(state, report).await;
        drop(guard);
        next
    }

    /// Unsynchronized selection; only call with the lock held.
    async fn next_run(
        &self,
        state: &mut QueueState,
        report: &mut BurstReport,
    ) -> Result<Option<Run>, QueueError> {
        let staged = self.repository.list_staged().await?;
        if staged.is_empty() {
            return Ok(None);
        }

        let running = if state.config.ignore_running {
            Vec::new()
        } else {
            self.repository.list_running(&state.self_run_id).await?
        };

        // Any other active run blocks every staged run; the walk only
        // decides which runs get a waiting notice.
        for run in staged {
            if !running.is_empty() {
                if state.note_waiting(&run, &running) {
                    report.newly_waiting.push(run.id.clone());
                }
                continue;
            }
            self.repository.mark_pending(&run).await?;
            return Ok(Some(run));
        }
        Ok(None)
    }

    async fn start_run(
        &self,
        run: &Run,
        state: &mut QueueState,
        report: &mut BurstReport,
    ) -> Result<(), QueueError> {
        info!("Starting staged run {}", run.id);
        report.dispatched.push(run.id.clone());

        match self.launcher.launch(run).await {
            Ok(()) => {}
            Err(LaunchError::Failed { run_id, exit_code }) => {
                error!("{} failed with exit code {}", run_id, exit_code);
                report.failed.push((run_id, exit_code));
            }
            Err(e) => return Err(e.into()),
        }

        state.reset_waiting();
        Ok(())
    }
}
