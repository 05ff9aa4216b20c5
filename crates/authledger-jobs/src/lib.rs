//! Asynchronous processing for authledger: a durable job queue and the
//! runner that drains it.
//!
//! Jobs are stored as a type discriminator plus a JSON payload. The
//! discriminator selects both the deserialization path ([`JobKind`] to
//! [`JobPayload`]) and the processor ([`ProcessorRegistry`]). Unknown types
//! and corrupt payloads fail that one job only.
//!
//! A job is deleted from `jobs` when it is claimed, and a processing
//! failure moves it to `failed_jobs`. Nothing is requeued automatically: a
//! runner crash between claim and completion needs manual recovery, and
//! failed jobs go back to the queue through [`JobsStore::replay_failed`].

mod error;
mod job;
mod registry;
mod runner;
mod store;

pub use error::JobError;
pub use job::{JobKind, JobPayload, ParseJobKindError, StoredJob};
pub use registry::{Processor, ProcessorRegistry, TrackerFanout};
pub use runner::{JobRunner, RunMode, RunnerLimits, RunnerSummary, StopReason};
pub use store::{JobsStore, JOB_TYPE_MAX_LENGTH, TABLE_FAILED_JOBS, TABLE_JOBS};
