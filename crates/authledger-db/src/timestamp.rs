//! Timestamp encoding for stored rows.
//!
//! Timestamps are UTC, fixed width and microsecond precise, so that SQL
//! string comparison (`<`, `ORDER BY`) agrees with chronological order.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Encodes a timestamp for storage.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Decodes a stored timestamp.
///
/// # Errors
///
/// Returns the chrono parse error if `raw` is not in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}
