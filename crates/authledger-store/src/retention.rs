//! Retention enforcement across trackers.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::tracker::DataTracker;

/// The instant `retention` before now.
///
/// # Errors
///
/// Returns `StoreError::RetentionOutOfRange` when the subtraction
/// overflows.
pub fn retention_cutoff(retention: Duration) -> Result<DateTime<Utc>, StoreError> {
    Utc::now()
        .checked_sub_signed(retention)
        .ok_or(StoreError::RetentionOutOfRange {
            days: retention.num_days(),
        })
}

/// Deletes data older than `retention` from every tracker.
///
/// The cutoff is computed once, so every tracker prunes against the same
/// instant. Returns the total number of deleted rows.
///
/// # Errors
///
/// Returns the first `StoreError`; trackers after the failing one are not
/// swept in that run.
pub fn enforce_data_retention_policy(
    trackers: &[Arc<dyn DataTracker>],
    retention: Duration,
) -> Result<usize, StoreError> {
    let cutoff = retention_cutoff(retention)?;

    let mut deleted = 0;
    for tracker in trackers {
        deleted += tracker.delete_data_older_than(cutoff)?;
    }

    tracing::info!(
        cutoff = %cutoff,
        deleted,
        trackers = trackers.len(),
        "retention policy enforced"
    );

    Ok(deleted)
}
