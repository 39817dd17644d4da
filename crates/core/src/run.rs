use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable run identifier (directory name under the runs root).
pub type RunId = String;

/// Length of the display form of a run id.
const SHORT_ID_LEN: usize = 8;

/// Name of the per-run directory placed on the launch search path.
pub const JOB_PACKAGES_DIR: &str = "job-packages";

/// Persisted run status. The scheduler only reads `Staged`/`Running`
/// and writes the `Staged -> Pending` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Staged,
    Pending,
    Running,
    Completed,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Staged => "staged",
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A unit of work owned by the run repository.
///
/// The scheduler only ever holds transient copies; `dir` is filled in by the
/// repository that loaded the record and is not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    /// Staging order key.
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Run {
    pub fn new(id: impl Into<RunId>, timestamp: DateTime<Utc>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            timestamp,
            status,
            dir: PathBuf::new(),
        }
    }

    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = dir.as_ref().to_path_buf();
        self
    }

    /// Display form of the id, used in log lines.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    /// Private package directory handed to the launcher as its search path.
    pub fn job_packages_dir(&self) -> PathBuf {
        self.dir.join(JOB_PACKAGES_DIR)
    }

    pub fn is_staged(&self) -> bool {
        self.status == RunStatus::Staged
    }
}

/// Comma separated short ids, e.g. for "waiting for runs to finish" lines.
pub fn describe_runs(runs: &[Run]) -> String {
    runs.iter()
        .map(Run::short_id)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(id: &str) -> Run {
        Run::new(id, Utc.timestamp_opt(1, 0).unwrap(), RunStatus::Running)
    }

    #[test]
    fn test_short_id_truncates() {
        let r = run("0123456789abcdef");
        assert_eq!(r.short_id(), "01234567");
    }

    #[test]
    fn test_short_id_keeps_short_ids() {
        assert_eq!(run("abc").short_id(), "abc");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::Pending.to_string(), "pending");
        assert_eq!(RunStatus::Staged.to_string(), "staged");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RunStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_dir_not_serialized() {
        let r = run("r1").with_dir("/tmp/runs/r1");
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("/tmp/runs"));
        let back: Run = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dir, PathBuf::new());
        assert_eq!(back.id, "r1");
    }

    #[test]
    fn test_job_packages_dir() {
        let r = run("r1").with_dir("/tmp/runs/r1");
        assert_eq!(r.job_packages_dir(), PathBuf::from("/tmp/runs/r1/job-packages"));
    }

    #[test]
    fn test_describe_runs() {
        let runs = vec![run("aaaaaaaaaaaa"), run("bb")];
        assert_eq!(describe_runs(&runs), "aaaaaaaa, bb");
    }
}
