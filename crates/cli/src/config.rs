use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use runq_core::RunqHome;
use runq_queue::launcher::DEFAULT_SEARCH_PATH_VAR;
use runq_queue::lock::DEFAULT_RETRY_INTERVAL;
use runq_queue::ProcessLauncher;

/// Launcher settings loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Program that executes a run; the run id is appended to its args
    #[serde(default = "default_program")]
    pub launch_program: String,

    /// Arguments placed before the run id
    #[serde(default = "default_args")]
    pub launch_args: Vec<String>,

    /// Env var pointing the launched run at its job packages
    #[serde(default = "default_search_path_var")]
    pub search_path_var: String,

    /// Delay between attempts on a contended run-status lock
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,
}

fn default_program() -> String {
    "runq".to_string()
}

fn default_args() -> Vec<String> {
    vec!["run".to_string(), "--restart".to_string()]
}

fn default_search_path_var() -> String {
    DEFAULT_SEARCH_PATH_VAR.to_string()
}

fn default_lock_retry_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            launch_program: default_program(),
            launch_args: default_args(),
            search_path_var: default_search_path_var(),
            lock_retry_ms: default_lock_retry_ms(),
        }
    }
}

impl LaunchConfig {
    /// Load config from the given path, or `<home>/queue.toml`.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&Path>, home: &RunqHome) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => home.config_file(),
        };
        Self::load_file(&config_path)
    }

    fn load_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(?config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))?;
        Ok(config)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms.max(1))
    }

    pub fn launcher(&self) -> ProcessLauncher {
        ProcessLauncher::new(&self.launch_program)
            .with_args(self.launch_args.clone())
            .with_search_path_var(&self.search_path_var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LaunchConfig::default();
        assert_eq!(config.launch_program, "runq");
        assert_eq!(config.search_path_var, "RUNQ_JOB_PATH");
        assert_eq!(config.lock_retry_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let home = RunqHome::new(dir.path());
        let config = LaunchConfig::load(None, &home).unwrap();
        assert_eq!(config, LaunchConfig::default());
        assert!(!home.config_file().exists());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, "launch_program = \"/opt/bin/exec-run\"\nlock_retry_ms = 0\n").unwrap();

        let config = LaunchConfig::load(Some(&path), &RunqHome::new(dir.path())).unwrap();
        assert_eq!(config.launch_program, "/opt/bin/exec-run");
        assert_eq!(config.launch_args, vec!["run", "--restart"]);
        assert_eq!(config.lock_retry_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, "launch_args = 3").unwrap();
        let err = LaunchConfig::load(Some(&path), &RunqHome::new(dir.path())).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }
}
