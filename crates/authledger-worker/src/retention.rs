//! Background task for enforcing the data retention policy.

use std::sync::Arc;
use std::time::Duration;

use authledger_store::{enforce_data_retention_policy, DataTracker};
use tokio::time::sleep;

/// Runs one retention sweep on the blocking pool.
///
/// Returns the number of deleted rows, or `None` if the sweep failed; the
/// failure is logged.
pub async fn run_retention_pass(
    trackers: Vec<Arc<dyn DataTracker>>,
    retention: chrono::Duration,
) -> Option<usize> {
    let result =
        tokio::task::spawn_blocking(move || enforce_data_retention_policy(&trackers, retention))
            .await;

    match result {
        Ok(Ok(count)) => {
            if count > 0 {
                tracing::info!(count, "deleted data past retention");
            } else {
                tracing::debug!("no data past retention to delete");
            }
            Some(count)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to enforce retention policy");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "retention task panicked or was cancelled");
            None
        }
    }
}

/// Starts a background task that periodically enforces retention.
///
/// This task runs indefinitely. The first sweep happens after one interval.
pub async fn start_retention_task(
    trackers: Vec<Arc<dyn DataTracker>>,
    retention: chrono::Duration,
    interval_seconds: u64,
) {
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(
        interval_seconds,
        retention_days = retention.num_days(),
        "starting retention enforcement task"
    );

    loop {
        sleep(interval).await;
        run_retention_pass(trackers.clone(), retention).await;
    }
}
