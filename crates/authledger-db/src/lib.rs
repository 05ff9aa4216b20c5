//! Connection and migration layer for authledger.
//!
//! Provides SQLite connection pooling (via `r2d2`) split by connection role,
//! WAL-mode initialization, reversible table migrations and the migrator
//! that tracks which migrations have been applied.
//!
//! # Design decisions
//!
//! - **Role-split pools**: writes always go through the `master` pool.
//!   Reads go through the `slave` pool when one is configured (typically a
//!   replica), otherwise through `master`.
//! - **Existence-checked migrations**: every table migration checks the
//!   schema before creating or dropping, so running a migration against a
//!   schema that is already in the target state is a no-op.
//! - **Tracking table**: applied migrations are recorded by name in
//!   `authledger_migrations` and never reapplied.
//! - **Fixed-width timestamps**: timestamps are stored as UTC text with
//!   microsecond precision so that string order is chronological order.

mod connections;
mod migrations;
mod pool;
mod timestamp;

pub use connections::{ConnectionRole, Connections};
pub use migrations::{
    run_migrations, table_exists, Migration, MigrationError, Migrator, TableMigration,
    TRACKING_TABLE,
};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, PooledConnection};
pub use timestamp::{format_timestamp, parse_timestamp, TIMESTAMP_FORMAT};
