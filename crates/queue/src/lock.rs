//! Cross-process run-status lock.
//!
//! Every scheduler that reads "which run is next" or claims a run must hold
//! this lock. The file adapter uses advisory `flock`-style locks, so the lock
//! is released by the OS if the holder dies.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::LockError;

/// Delay between attempts while the lock is contended.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded-wait mutual exclusion shared by cooperating schedulers.
///
/// The returned guard releases the lock when dropped, so every exit path
/// of the guarded section (early return, `?`, panic unwind) releases it.
#[async_trait]
pub trait RunLock: Send + Sync {
    type Guard: Send;

    /// Wait up to `timeout` for the lock.
    async fn acquire(&self, timeout: Duration) -> Result<Self::Guard, LockError>;
}

// ── File lock ───────────────────────────────────────────────────────

/// Advisory lock on a well-known file.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    retry_interval: Duration,
}

impl FileLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> LockError {
        LockError::Io {
            lock_file: self.path.clone(),
            source,
        }
    }

    /// Single non-blocking attempt. `Ok(None)` when another holder has it.
    pub fn try_acquire(&self) -> Result<Option<FileLockGuard>, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let mut guard = FileLockGuard {
                    file: Some(file),
                    path: self.path.clone(),
                };
                guard.write_holder();
                debug!(lock = %self.path.display(), "Acquired lock");
                Ok(Some(guard))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[async_trait]
impl RunLock for FileLock {
    type Guard = FileLockGuard;

    async fn acquire(&self, timeout: Duration) -> Result<FileLockGuard, LockError> {
        let start = Instant::now();

        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    lock_file: self.path.clone(),
                    waited,
                });
            }

            debug!(
                lock = %self.path.display(),
                waited_ms = waited.as_millis() as u64,
                "Lock held elsewhere, retrying"
            );
            tokio::time::sleep(self.retry_interval.min(timeout - waited)).await;
        }
    }
}

/// A held file lock. Released on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl FileLockGuard {
    /// Record the holder pid for anyone inspecting a stuck lock file.
    fn write_holder(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = write_pid(file) {
                debug!(lock = %self.path.display(), error = %e, "Could not write lock holder");
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Release the lock. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(lock = %self.path.display(), error = %e, "Failed to unlock");
            }
            debug!(lock = %self.path.display(), "Released lock");
        }
    }
}

fn write_pid(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
