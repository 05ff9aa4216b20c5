//! Current-view store: latest service provider metadata, one connected
//! service row per service provider and user, and a prunable activity log.

mod schema;
mod store;

pub use schema::TABLE_PREFIX;
pub use store::CurrentStore;
