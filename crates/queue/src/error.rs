//! Queue error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use runq_core::{CoreError, RunId, RunStatus};

/// Failures of the cross-process run-status lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock not obtained before the deadline. Recoverable.
    #[error("timed out after {waited:?} waiting for lock {}", .lock_file.display())]
    Timeout { lock_file: PathBuf, waited: Duration },

    #[error("lock I/O error on {}: {source}", .lock_file.display())]
    Io {
        lock_file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("run repository I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run record error: {0}")]
    Record(#[from] serde_json::Error),

    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("run {run_id} is {status}, expected staged")]
    NotStaged { run_id: RunId, status: RunStatus },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    /// The run executed and exited non-zero. Recoverable.
    #[error("{run_id} failed with exit code {exit_code}")]
    Failed { run_id: RunId, exit_code: i32 },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal scheduler errors. Lock timeouts and failed runs never surface here.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}
