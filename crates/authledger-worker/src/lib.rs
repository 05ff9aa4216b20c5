//! Runtime around the authledger stores: configuration, dispatch of
//! authentication events, and the background job runner and retention
//! tasks used by the `authledger` binary.

pub mod accounting;
pub mod config;
pub mod retention;
pub mod runner;

pub use accounting::{Accounting, AccountingError, Outcome};
pub use config::{load_config, Config, ConfigError, ProcessingType};
