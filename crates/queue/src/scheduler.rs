//! Scheduler loop: run-once or fixed-interval polling over the controller.

use tracing::{debug, info};

use crate::controller::{BurstReport, QueueController, QueueState};
use crate::error::QueueError;
use crate::launcher::RunLauncher;
use crate::lock::RunLock;
use crate::repository::RunRepository;

/// Drain every currently eligible staged run once, then return.
pub async fn run_once<L, R, X>(
    controller: &QueueController<L, R, X>,
    state: &mut QueueState,
) -> Result<BurstReport, QueueError>
where
    L: RunLock,
    R: RunRepository,
    X: RunLauncher,
{
    info!("Processing staged runs");
    controller.drain(state).await
}

/// Drain, sleep `poll_interval`, repeat. Only returns on a fatal error.
///
/// There is no wake-up on new staged runs; pickup latency is bounded by
/// the poll interval.
pub async fn poll<L, R, X>(
    controller: &QueueController<L, R, X>,
    state: &mut QueueState,
) -> Result<(), QueueError>
where
    L: RunLock,
    R: RunRepository,
    X: RunLauncher,
{
    let interval = state.config().poll_interval;
    info!("Polling for staged runs every {}s", interval.as_secs());

    // Announce the first burst and the one after any dispatch; quiet
    // polls only show up at debug level.
    let mut announce = true;
    loop {
        if announce {
            info!("Processing staged runs");
        } else {
            debug!("Processing staged runs");
        }
        let report = controller.drain(state).await?;
        debug!(
            dispatched = report.dispatched.len(),
            failed = report.failed.len(),
            lock_timeouts = report.lock_timeouts,
            "Drain burst finished"
        );
        announce = !report.dispatched.is_empty();
        tokio::time::sleep(interval).await;
    }
}

/// Run in the mode selected by the state's config.
pub async fn run<L, R, X>(
    controller: &QueueController<L, R, X>,
    state: &mut QueueState,
) -> Result<(), QueueError>
where
    L: RunLock,
    R: RunRepository,
    X: RunLauncher,
{
    if state.config().run_once {
        run_once(controller, state).await.map(|_| ())
    } else {
        poll(controller, state).await
    }
}
