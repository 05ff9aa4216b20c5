//! Error types for the data stores.

use authledger_db::{MigrationError, PoolError};

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database statement or transaction failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool.
    #[error("store connection error: {0}")]
    Pool(#[from] PoolError),

    /// Schema setup failed.
    #[error("store setup error: {0}")]
    Migration(#[from] MigrationError),

    /// JSON serialization or deserialization failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The retention period reaches past the earliest representable instant.
    #[error("retention period of {days} days is out of range")]
    RetentionOutOfRange {
        /// The requested period, in whole days.
        days: i64,
    },

    /// A raw result row does not match the expected shape.
    #[error("invalid result row, column '{column}': {reason}")]
    Validation {
        /// The column that is missing or malformed.
        column: String,
        /// What was wrong with it.
        reason: String,
    },
}
