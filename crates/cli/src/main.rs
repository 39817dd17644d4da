mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use runq_core::config::{load_dotenv, RUN_STATUS_LOCK};
use runq_queue::{FileLock, FsRunRepository, QueueController, QueueState};

use crate::cli::CliArgs;
use crate::config::LaunchConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    load_dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let queue_config = args.queue_config();
    let home = args.home();

    let mut state = QueueState::from_env(queue_config.clone())
        .context("the queue must be started as a run (RUN_ID is not set)")?;

    let launch = LaunchConfig::load(args.config.as_deref(), &home)
        .context("failed to load launcher configuration")?;

    queue_config.log_summary();
    info!(
        home = %home.root.display(),
        self_run = %state.self_run_id(),
        program = %launch.launch_program,
        "Queue starting"
    );

    let lock = FileLock::new(home.lock_file(RUN_STATUS_LOCK))
        .with_retry_interval(launch.lock_retry_interval());
    let repository = FsRunRepository::new(home.runs_dir());
    let controller = QueueController::new(lock, repository, launch.launcher());

    runq_queue::run(&controller, &mut state)
        .await
        .context("queue stopped on an unrecoverable error")?;

    Ok(())
}
