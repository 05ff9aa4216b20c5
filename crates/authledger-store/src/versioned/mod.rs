//! Versioned store: every dimension change is kept as a new version and
//! every authentication is kept as a fact row.

mod schema;
mod store;

pub use schema::TABLE_PREFIX;
pub use store::VersionedStore;
