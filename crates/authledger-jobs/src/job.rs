//! Job types and their stored representation.

use authledger_db::parse_timestamp;
use authledger_types::AuthenticationEvent;
use chrono::{DateTime, Utc};

use crate::error::JobError;

/// Job type discriminators, as stored in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Persist an authentication event to the configured trackers.
    AuthenticationEvent,
}

impl JobKind {
    /// Returns the stored string label for this job type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthenticationEvent => "authentication_event",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authentication_event" => Ok(Self::AuthenticationEvent),
            _ => Err(ParseJobKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown job type string.
#[derive(Debug, Clone)]
pub struct ParseJobKindError(pub String);

impl std::fmt::Display for ParseJobKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown job type: {}", self.0)
    }
}

impl std::error::Error for ParseJobKindError {}

/// Job payloads, one variant per [`JobKind`].
///
/// Only the variant data is serialized into the `payload` column; the
/// variant itself is recovered from the `type` column.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    AuthenticationEvent(AuthenticationEvent),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::AuthenticationEvent(_) => JobKind::AuthenticationEvent,
        }
    }

    pub(crate) fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::AuthenticationEvent(event) => serde_json::to_string(event),
        }
    }

    fn decode(kind: JobKind, raw: &str) -> Result<Self, serde_json::Error> {
        match kind {
            JobKind::AuthenticationEvent => {
                serde_json::from_str(raw).map(Self::AuthenticationEvent)
            }
        }
    }
}

impl From<AuthenticationEvent> for JobPayload {
    fn from(event: AuthenticationEvent) -> Self {
        Self::AuthenticationEvent(event)
    }
}

/// A job row as read from the queue.
///
/// Columns are kept as stored text and only interpreted by
/// [`StoredJob::decode`], so a malformed row can still be claimed and moved
/// to the failed table unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJob {
    pub id: i64,
    pub job_type: String,
    pub payload: String,
    pub created_at: String,
}

impl StoredJob {
    /// Parses the stored creation time.
    pub fn created_at(&self) -> Result<DateTime<Utc>, JobError> {
        parse_timestamp(&self.created_at).map_err(|source| JobError::InvalidTimestamp {
            id: self.id,
            source,
        })
    }

    /// Deserializes the payload according to the stored type.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidTimestamp` for an unparseable `created_at`,
    /// `JobError::UnknownType` for an unrecognized discriminator and
    /// `JobError::CorruptPayload` when the payload does not match its type.
    pub fn decode(&self) -> Result<JobPayload, JobError> {
        self.created_at()?;

        let kind: JobKind = self
            .job_type
            .parse()
            .map_err(|_| JobError::UnknownType(self.job_type.clone()))?;

        JobPayload::decode(kind, &self.payload).map_err(|source| JobError::CorruptPayload {
            id: self.id,
            source,
        })
    }
}
