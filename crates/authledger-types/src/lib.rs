//! Entity and state model for authentication accounting.
//!
//! An authentication event reaches the accounting layer as a raw state
//! mapping (a JSON object produced by the authentication pipeline). This
//! crate turns that mapping into typed values:
//!
//! - [`State`] resolves the protocol and pulls provider metadata, user
//!   attributes, the authentication instant and the client address out of
//!   the raw mapping.
//! - [`AuthenticationEvent`] is the fully populated payload handed to the
//!   stores (directly, or through a job).
//! - [`ActivityBag`] and [`ConnectedServiceBag`] are the read-side result
//!   collections returned by the stores.
//!
//! Every parsing failure is a [`StateError`]; nothing is coerced into
//! partial data.

mod activity;
mod connected_service;
mod error;
mod event;
mod protocol;
mod provider;
mod state;
mod user;

pub use activity::{Activity, ActivityBag};
pub use connected_service::{ConnectedService, ConnectedServiceBag};
pub use error::StateError;
pub use event::AuthenticationEvent;
pub use protocol::{ParseProtocolError, Protocol};
pub use provider::Provider;
pub use state::State;
pub use user::User;

/// Maximum stored length of a client IP address (fits a full IPv6 text form).
pub const CLIENT_IP_ADDRESS_MAX_LENGTH: usize = 45;
