//! Tracker and provider interfaces, and construction by kind.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use authledger_db::Connections;
use authledger_types::{ActivityBag, AuthenticationEvent, ConnectedServiceBag};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::current::CurrentStore;
use crate::error::StoreError;
use crate::retention::retention_cutoff;
use crate::versioned::VersionedStore;

/// Schema self-check shared by trackers and providers.
pub trait Setup {
    /// Whether the schema is missing or has pending migrations.
    fn needs_setup(&self) -> Result<bool, StoreError>;

    /// Creates or migrates the schema. Does nothing, apart from logging a
    /// warning, when the schema is already current.
    fn run_setup(&self) -> Result<(), StoreError>;
}

/// Write side: receives authentication events and prunes old data.
pub trait DataTracker: Setup + Send + Sync {
    /// Records one authentication event.
    fn process(&self, event: &AuthenticationEvent) -> Result<(), StoreError>;

    /// Deletes prunable rows that happened strictly before `cutoff`.
    /// Returns the number of deleted rows.
    fn delete_data_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Deletes prunable rows older than `retention` from now.
    fn enforce_data_retention_policy(&self, retention: Duration) -> Result<usize, StoreError> {
        self.delete_data_older_than(retention_cutoff(retention)?)
    }
}

/// Read side: answers per-user queries.
pub trait DataProvider: Setup + Send + Sync {
    /// Authentication events of the user, newest first, paginated.
    fn get_activity(
        &self,
        user_identifier: &str,
        max_results: u32,
        first_result: u32,
    ) -> Result<ActivityBag, StoreError>;

    /// Service providers the user has authenticated to.
    fn get_connected_service_providers(
        &self,
        user_identifier: &str,
    ) -> Result<ConnectedServiceBag, StoreError>;
}

/// The available store implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    Versioned,
    Current,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::Versioned => "versioned",
            TrackerKind::Current => "current",
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tracker kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tracker kind: '{0}'")]
pub struct ParseTrackerKindError(pub String);

impl FromStr for TrackerKind {
    type Err = ParseTrackerKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "versioned" => Ok(TrackerKind::Versioned),
            "current" => Ok(TrackerKind::Current),
            _ => Err(ParseTrackerKindError(s.to_string())),
        }
    }
}

/// Builds the tracker of the given kind over `connections`.
pub fn build_tracker(kind: TrackerKind, connections: Connections) -> Arc<dyn DataTracker> {
    match kind {
        TrackerKind::Versioned => Arc::new(VersionedStore::new(connections)),
        TrackerKind::Current => Arc::new(CurrentStore::new(connections)),
    }
}

/// Builds the provider of the given kind over `connections`.
pub fn build_provider(kind: TrackerKind, connections: Connections) -> Arc<dyn DataProvider> {
    match kind {
        TrackerKind::Versioned => Arc::new(VersionedStore::new(connections)),
        TrackerKind::Current => Arc::new(CurrentStore::new(connections)),
    }
}
