//! Run launcher port and the process-spawning adapter.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use runq_core::Run;

use crate::error::LaunchError;

/// Suppresses the "restarting" notice of the launched run.
pub const NO_RESTARTING_MSG_ENV: &str = "NO_RESTARTING_MSG";

/// Default variable pointing the launched run at its job packages.
pub const DEFAULT_SEARCH_PATH_VAR: &str = "RUNQ_JOB_PATH";

/// Exit code reported when the run was killed by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Starts a claimed run and waits for it to finish.
#[async_trait]
pub trait RunLauncher: Send + Sync {
    /// Returns `LaunchError::Failed` when the run exits non-zero.
    async fn launch(&self, run: &Run) -> Result<(), LaunchError>;
}

/// Environment overrides passed through to a launched run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnv {
    pub vars: BTreeMap<String, String>,
}

impl LaunchEnv {
    pub fn for_run(run: &Run, search_path_var: &str) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(NO_RESTARTING_MSG_ENV.to_string(), "1".to_string());
        vars.insert(
            search_path_var.to_string(),
            run.job_packages_dir().display().to_string(),
        );
        Self { vars }
    }

    pub fn apply_to_command(&self, cmd: &mut Command) {
        for (key, value) in &self.vars {
            cmd.env(key, value);
        }
    }
}

/// Launches `<program> <args...> <run id>` and waits for it.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    search_path_var: String,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            search_path_var: DEFAULT_SEARCH_PATH_VAR.to_string(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    /// Build the command for `run` without spawning it.
    pub fn command(&self, run: &Run) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&run.id);
        LaunchEnv::for_run(run, &self.search_path_var).apply_to_command(&mut cmd);
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RunLauncher for ProcessLauncher {
    async fn launch(&self, run: &Run) -> Result<(), LaunchError> {
        debug!(
            run = %run.id,
            program = %self.program.display(),
            "Spawning run"
        );
        let status = self
            .command(run)
            .status()
            .await
            .map_err(|source| LaunchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if status.success() {
            return Ok(());
        }
        Err(LaunchError::Failed {
            run_id: run.id.clone(),
            exit_code: status.code().unwrap_or(SIGNALED_EXIT_CODE),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use runq_core::RunStatus;

    use super::*;

    fn run() -> Run {
        Run::new("abc", Utc::now(), RunStatus::Staged).with_dir("/srv/runq/runs/abc")
    }

    #[test]
    fn test_launch_env_overrides() {
        let env = LaunchEnv::for_run(&run(), "MY_PATH");
        assert_eq!(env.vars.get("NO_RESTARTING_MSG").map(String::as_str), Some("1"));
        assert_eq!(
            env.vars.get("MY_PATH").map(String::as_str),
            Some("/srv/runq/runs/abc/job-packages")
        );
    }

    #[test]
    fn test_command_appends_run_id() {
        let r = run();
        let launcher = ProcessLauncher::new("runq").with_args(vec!["run".into(), "--restart".into()]);
        let cmd = launcher.command(&r);
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["run".to_string(), "--restart".to_string(), r.id.clone()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_is_ok() {
        let launcher = ProcessLauncher::new("true");
        assert!(launcher.launch(&run()).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_code() {
        let launcher = ProcessLauncher::new("sh").with_args(vec!["-c".into(), "exit 2".into()]);
        let r = run();
        match launcher.launch(&r).await {
            Err(LaunchError::Failed { run_id, exit_code }) => {
                assert_eq!(run_id, r.id);
                assert_eq!(exit_code, 2);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launched_run_sees_env() {
        let launcher = ProcessLauncher::new("sh")
            .with_args(vec![
                "-c".into(),
                r#"[ "$NO_RESTARTING_MSG" = 1 ] && [ "$RUNQ_JOB_PATH" = /srv/runq/runs/abc/job-packages ]"#.into(),
            ]);
        assert!(launcher.launch(&run()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let launcher = ProcessLauncher::new("/nonexistent/runq-launcher");
        assert!(matches!(
            launcher.launch(&run()).await,
            Err(LaunchError::Spawn { .. })
        ));
    }
}
