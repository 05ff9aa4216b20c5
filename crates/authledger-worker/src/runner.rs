//! Background task driving the job runner.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use authledger_jobs::{JobRunner, StopReason};
use tokio::time::sleep;

/// Runs the job runner in passes on the blocking pool until its stop flag
/// is set.
///
/// A pass ends when the queue is empty or a pause threshold is reached.
/// After a pass that emptied the queue the task sleeps for `idle_sleep`;
/// after a voluntary pause it starts the next pass right away.
pub async fn start_job_runner_task(runner: Arc<JobRunner>, idle_sleep: Duration) {
    let stop = runner.stop_handle();
    tracing::info!(
        idle_sleep_ms = idle_sleep.as_millis() as u64,
        "starting job runner task"
    );

    loop {
        let pass = Arc::clone(&runner);
        let result = tokio::task::spawn_blocking(move || pass.run()).await;

        let idle = match result {
            Ok(Ok(summary)) => summary.stop_reason == StopReason::QueueEmpty,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "job runner pass failed");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "job runner pass panicked or was cancelled");
                true
            }
        };

        if stop.load(Ordering::Relaxed) {
            break;
        }
        if idle {
            sleep(idle_sleep).await;
        }
    }

    tracing::info!("job runner task stopped");
}
