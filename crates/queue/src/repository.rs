//! Run repository port and its directory-backed adapter.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use runq_core::{Run, RunStatus};

use crate::error::RepositoryError;

/// File holding a run's persisted record inside its directory.
pub const RECORD_FILE: &str = "run.json";

/// Narrow query/mutate interface the queue controller needs.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Runs with status `staged`, ascending by timestamp.
    async fn list_staged(&self) -> Result<Vec<Run>, RepositoryError>;

    /// Runs with status `running`, minus `excluding`.
    async fn list_running(&self, excluding: &str) -> Result<Vec<Run>, RepositoryError>;

    /// Claim a staged run. Callers must hold the run-status lock.
    async fn mark_pending(&self, run: &Run) -> Result<(), RepositoryError>;
}

/// Sort in staging order; ties fall back to the id so the order is total.
pub fn sort_staging_order(runs: &mut [Run]) {
    runs.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ── Directory-backed repository ─────────────────────────────────────

/// Runs stored as `<runs_dir>/<id>/run.json`.
#[derive(Debug, Clone)]
pub struct FsRunRepository {
    runs_dir: PathBuf,
}

impl FsRunRepository {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        Self {
            runs_dir: runs_dir.as_ref().to_path_buf(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    fn run_dir(&self, id: &str) -> PathBuf {
        self.runs_dir.join(id)
    }

    /// Load a single run by id.
    pub fn load(&self, id: &str) -> Result<Run, RepositoryError> {
        let dir = self.run_dir(id);
        let path = dir.join(RECORD_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let run: Run = serde_json::from_str(&content)?;
        Ok(run.with_dir(dir))
    }

    /// All readable runs. Unreadable records are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<Run>, RepositoryError> {
        let entries = match fs::read_dir(&self.runs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(runs_dir = %self.runs_dir.display(), "Runs directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load(&id) {
                Ok(run) => runs.push(run),
                Err(RepositoryError::NotFound(_)) => continue,
                Err(e) => {
                    warn!(run = %id, error = %e, "Skipping unreadable run record");
                }
            }
        }
        Ok(runs)
    }

    fn with_status(&self, status: RunStatus) -> Result<Vec<Run>, RepositoryError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    /// Persist a run record, replacing any previous one atomically.
    pub fn save(&self, run: &Run) -> Result<Run, RepositoryError> {
        let dir = self.run_dir(&run.id);
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(run)?;
        let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, dir.join(RECORD_FILE))?;
        Ok(run.clone().with_dir(dir))
    }

    /// Queue a new run for the scheduler.
    pub fn stage(&self, run: &Run) -> Result<Run, RepositoryError> {
        let mut staged = run.clone();
        staged.status = RunStatus::Staged;
        self.save(&staged)
    }

    pub fn set_status(&self, id: &str, status: RunStatus) -> Result<Run, RepositoryError> {
        let mut run = self.load(id)?;
        run.status = status;
        self.save(&run)
    }
}

#[async_trait]
impl RunRepository for FsRunRepository {
    async fn list_staged(&self) -> Result<Vec<Run>, RepositoryError> {
        let mut staged = self.with_status(RunStatus::Staged)?;
        sort_staging_order(&mut staged);
        Ok(staged)
    }

    async fn list_running(&self, excluding: &str) -> Result<Vec<Run>, RepositoryError> {
        Ok(self
            .with_status(RunStatus::Running)?
            .into_iter()
            .filter(|r| r.id != excluding)
            .collect())
    }

    async fn mark_pending(&self, run: &Run) -> Result<(), RepositoryError> {
        let current = self.load(&run.id)?;
        if !current.is_staged() {
            return Err(RepositoryError::NotStaged {
                run_id: run.id.clone(),
                status: current.status,
            });
        }
        self.set_status(&run.id, RunStatus::Pending)?;
        debug!(run = %run.id, "Marked run pending");
        Ok(())
    }
}

/// Ids of the given runs, in order.
#[cfg(test)]
fn run_ids(runs: &[Run]) -> Vec<runq_core::RunId> {
    runs.iter().map(|r| r.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64, id: &str, status: RunStatus) -> Run {
        Run::new(id, Utc.timestamp_opt(secs, 0).unwrap(), status)
    }

    fn repo() -> (tempfile::TempDir, FsRunRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRunRepository::new(dir.path().join("runs"));
        (dir, repo)
    }

    #[tokio::test]
    async fn test_missing_runs_dir_is_empty() {
        let (_dir, repo) = repo();
        assert!(repo.list_staged().await.unwrap().is_empty());
        assert!(repo.list_running("self").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_staged_sorted_by_timestamp() {
        let (_dir, repo) = repo();
        repo.stage(&at(30, "c", RunStatus::Staged)).unwrap();
        repo.stage(&at(10, "a", RunStatus::Staged)).unwrap();
        repo.save(&at(5, "done", RunStatus::Completed)).unwrap();
        repo.stage(&at(20, "b", RunStatus::Staged)).unwrap();

        let staged = repo.list_staged().await.unwrap();
        assert_eq!(run_ids(&staged), vec!["a", "b", "c"]);
        assert!(staged.iter().all(|r| r.dir.ends_with(&r.id)));
    }

    #[tokio::test]
    async fn test_equal_timestamps_ordered_by_id() {
        let (_dir, repo) = repo();
        repo.stage(&at(1, "y", RunStatus::Staged)).unwrap();
        repo.stage(&at(1, "x", RunStatus::Staged)).unwrap();
        let staged = repo.list_staged().await.unwrap();
        assert_eq!(run_ids(&staged), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_list_running_excludes_self() {
        let (_dir, repo) = repo();
        repo.save(&at(1, "queue", RunStatus::Running)).unwrap();
        repo.save(&at(2, "train", RunStatus::Running)).unwrap();
        repo.stage(&at(3, "next", RunStatus::Staged)).unwrap();

        let running = repo.list_running("queue").await.unwrap();
        assert_eq!(run_ids(&running), vec!["train"]);
    }

    #[tokio::test]
    async fn test_mark_pending_removes_from_staged() {
        let (_dir, repo) = repo();
        let run = repo.stage(&at(1, "a", RunStatus::Staged)).unwrap();
        repo.mark_pending(&run).await.unwrap();

        assert!(repo.list_staged().await.unwrap().is_empty());
        assert_eq!(repo.load("a").unwrap().status, RunStatus::Pending);
        assert!(!run.dir.join("run.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_mark_pending_twice_is_rejected() {
        let (_dir, repo) = repo();
        let run = repo.stage(&at(1, "a", RunStatus::Staged)).unwrap();
        repo.mark_pending(&run).await.unwrap();
        let err = repo.mark_pending(&run).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::NotStaged { status: RunStatus::Pending, .. }
        ));
    }

    #[tokio::test]
    async fn test_unreadable_record_skipped() {
        let (_dir, repo) = repo();
        repo.stage(&at(1, "good", RunStatus::Staged)).unwrap();
        let bad = repo.runs_dir().join("bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join(RECORD_FILE), "{ not json").unwrap();
        fs::create_dir_all(repo.runs_dir().join("empty")).unwrap();

        let staged = repo.list_staged().await.unwrap();
        assert_eq!(run_ids(&staged), vec!["good"]);
    }

    #[test]
    fn test_load_missing_run() {
        let (_dir, repo) = repo();
        assert!(matches!(
            repo.load("nope").unwrap_err(),
            RepositoryError::NotFound(_)
        ));
    }
}
