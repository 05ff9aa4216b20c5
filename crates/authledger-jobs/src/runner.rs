//! The job runner loop.
//!
//! The runner moves through `Idle -> Claim -> Process -> Success | Failure`
//! and back to `Claim`. Pause conditions are checked only before claiming,
//! so a claimed job is always either processed or moved to the failed
//! table before the runner stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::JobError;
use crate::job::StoredJob;
use crate::registry::ProcessorRegistry;
use crate::store::JobsStore;

/// Courtesy limits after which the runner pauses voluntarily.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerLimits {
    /// Stop claiming once this much time has passed since `run` started.
    pub max_execution_time: Option<Duration>,
    /// Stop claiming once this many jobs have been processed.
    pub pause_after_jobs: Option<u32>,
}

/// What the runner does when the queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Return as soon as the queue is empty.
    Drain,
    /// Sleep for `idle_sleep` and poll again.
    Continuous { idle_sleep: Duration },
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QueueEmpty,
    MaxJobsReached,
    MaxExecutionTimeReached,
    Stopped,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSummary {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub stop_reason: StopReason,
}

#[derive(Debug)]
enum RunnerState {
    Idle,
    Claim,
    Process(StoredJob),
    Success(StoredJob),
    Failure(StoredJob, String),
}

/// Claims jobs from a [`JobsStore`] and dispatches them through a
/// [`ProcessorRegistry`].
#[derive(Debug)]
pub struct JobRunner {
    store: JobsStore,
    registry: ProcessorRegistry,
    limits: RunnerLimits,
    mode: RunMode,
    stop: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(store: JobsStore, registry: ProcessorRegistry, limits: RunnerLimits) -> Self {
        Self {
            store,
            registry,
            limits,
            mode: RunMode::Drain,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Flag that, once set, makes the runner stop before its next claim.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs until the queue is empty (in drain mode), a limit is reached,
    /// or the stop flag is set.
    ///
    /// A failing job is recorded in the failed table and the loop goes on.
    ///
    /// # Errors
    ///
    /// Returns `JobError` only when the queue itself cannot be read or
    /// written.
    pub fn run(&self) -> Result<RunnerSummary, JobError> {
        let started = Instant::now();
        let mut processed = 0;
        let mut succeeded = 0;
        let mut failed = 0;
        let mut state = RunnerState::Claim;

        let stop_reason = loop {
            state = match state {
                RunnerState::Idle => match self.mode {
                    RunMode::Drain => break StopReason::QueueEmpty,
                    RunMode::Continuous { idle_sleep } => {
                        std::thread::sleep(idle_sleep);
                        RunnerState::Claim
                    }
                },
                RunnerState::Claim => {
                    if let Some(reason) = self.pause_reason(started, processed) {
                        break reason;
                    }
                    match self.store.dequeue_next()? {
                        Some(job) => RunnerState::Process(job),
                        None => RunnerState::Idle,
                    }
                }
                RunnerState::Process(job) => {
                    processed += 1;
                    match job.decode().and_then(|payload| self.registry.dispatch(&payload)) {
                        Ok(()) => RunnerState::Success(job),
                        Err(e) => RunnerState::Failure(job, e.to_string()),
                    }
                }
                RunnerState::Success(job) => {
                    succeeded += 1;
                    tracing::debug!(job_id = job.id, job_type = %job.job_type, "job processed");
                    RunnerState::Claim
                }
                RunnerState::Failure(job, error) => {
                    failed += 1;
                    self.store.mark_failed(&job, &error)?;
                    RunnerState::Claim
                }
            };
        };

        let summary = RunnerSummary {
            processed,
            succeeded,
            failed,
            stop_reason,
        };
        tracing::info!(
            processed,
            succeeded,
            failed,
            stop_reason = ?stop_reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job runner paused"
        );

        Ok(summary)
    }

    fn pause_reason(&self, started: Instant, processed: u32) -> Option<StopReason> {
        if self.stop.load(Ordering::Relaxed) {
            return Some(StopReason::Stopped);
        }
        if let Some(max) = self.limits.pause_after_jobs {
            if processed >= max {
                return Some(StopReason::MaxJobsReached);
            }
        }
        if let Some(max) = self.limits.max_execution_time {
            if started.elapsed() >= max {
                return Some(StopReason::MaxExecutionTimeReached);
            }
        }
        None
    }
}
