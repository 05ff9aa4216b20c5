//! The authentication event payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::protocol::Protocol;
use crate::provider::Provider;
use crate::state::State;
use crate::user::User;

/// A fully populated authentication event, ready to be persisted.
///
/// This is also the payload carried by authentication event jobs, so it
/// round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationEvent {
    pub identity_provider: Provider,
    pub service_provider: Provider,
    pub user: User,
    pub protocol: Protocol,
    pub happened_at: DateTime<Utc>,
    pub client_ip_address: Option<String>,
}

impl AuthenticationEvent {
    /// Builds an event from resolved state.
    ///
    /// The user identifier is read from `user_id_attribute_name`. When the
    /// state carries no authentication instant, the current time is used.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingUserIdentifier` if the identifier
    /// attribute is not released.
    pub fn from_state(state: State, user_id_attribute_name: &str) -> Result<Self, StateError> {
        let user = User::from_attributes(state.attributes, user_id_attribute_name)?;

        Ok(Self {
            identity_provider: state.identity_provider,
            service_provider: state.service_provider,
            user,
            protocol: state.protocol,
            happened_at: state.authentication_instant.unwrap_or_else(Utc::now),
            client_ip_address: state.client_ip_address,
        })
    }

    /// Returns a copy of this event with a different occurrence time.
    pub fn with_happened_at(mut self, happened_at: DateTime<Utc>) -> Self {
        self.happened_at = happened_at;
        self
    }
}
