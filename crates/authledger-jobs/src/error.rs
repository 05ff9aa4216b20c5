//! Error types for the job queue and runner.

use authledger_db::{MigrationError, PoolError};
use authledger_store::StoreError;

use crate::job::JobKind;

/// Errors surfaced by queue and runner operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A database statement or transaction failed.
    #[error("job queue database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool.
    #[error("job queue connection error: {0}")]
    Pool(#[from] PoolError),

    /// Queue schema setup failed.
    #[error("job queue setup error: {0}")]
    Migration(#[from] MigrationError),

    /// A payload could not be serialized for enqueueing.
    #[error("failed to serialize job payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored type discriminator is not a known job type.
    #[error("unknown job type: '{0}'")]
    UnknownType(String),

    /// The stored payload does not deserialize into its job type.
    #[error("corrupt payload in job {id}: {source}")]
    CorruptPayload {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid created_at in job {id}: {source}")]
    InvalidTimestamp {
        id: i64,
        #[source]
        source: chrono::ParseError,
    },

    /// No processor is registered for the job type.
    #[error("no processor registered for job type '{0}'")]
    NoProcessor(JobKind),

    /// The processor failed to handle the job.
    #[error("job processing failed: {0}")]
    Processing(#[from] StoreError),
}
