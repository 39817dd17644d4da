pub mod controller;
pub mod error;
pub mod launcher;
pub mod lock;
pub mod repository;
pub mod scheduler;

pub use controller::{BurstReport, QueueController, QueueState};
pub use error::{LaunchError, LockError, QueueError, RepositoryError};
pub use launcher::{LaunchEnv, ProcessLauncher, RunLauncher};
pub use lock::{FileLock, FileLockGuard, RunLock};
pub use repository::{FsRunRepository, RunRepository};
pub use scheduler::{poll, run, run_once};
