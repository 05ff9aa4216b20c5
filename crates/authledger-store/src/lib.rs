//! Authentication event stores for authledger.
//!
//! Two stores record the same events differently:
//!
//! - [`VersionedStore`] keeps every distinct version of identity provider,
//!   service provider and user data, and one fact row per authentication.
//!   Persisting identical data twice adds a fact row but no new version.
//! - [`CurrentStore`] keeps only the latest service provider metadata and
//!   one connected service row per service provider and user, plus an
//!   activity log.
//!
//! Both implement [`DataTracker`] (write side, retention) and
//! [`DataProvider`] (read side). Writes use the master connection pool;
//! reads prefer the slave pool.
//!
//! Dimension versioning is shared through table-driven helpers rather than
//! per-store code. Content is compared by the SHA-256 of its canonical JSON
//! form.

mod current;
mod dimension;
mod error;
mod hashing;
mod raw;
mod retention;
mod setup;
mod tracker;
mod versioned;

pub use current::{CurrentStore, TABLE_PREFIX as CURRENT_TABLE_PREFIX};
pub use error::StoreError;
pub use hashing::{canonical_json, sha256_hex};
pub use raw::{activity_from_raw, connected_service_from_raw, RawRow};
pub use retention::{enforce_data_retention_policy, retention_cutoff};
pub use tracker::{
    build_provider, build_tracker, DataProvider, DataTracker, ParseTrackerKindError, Setup,
    TrackerKind,
};
pub use versioned::{VersionedStore, TABLE_PREFIX as VERSIONED_TABLE_PREFIX};
