//! Error types for state parsing.

use thiserror::Error;

/// Errors raised while turning a raw state mapping into typed values.
#[derive(Debug, Error)]
pub enum StateError {
    /// A required key is absent from the state mapping.
    #[error("state is missing required key '{0}'")]
    MissingKey(&'static str),

    /// A key is present but its value has the wrong shape.
    #[error("state key '{key}' is invalid: {reason}")]
    InvalidValue {
        /// The offending key.
        key: &'static str,
        /// What was wrong with the value.
        reason: String,
    },

    /// The state matches neither the SAML 2 nor the OpenID Connect layout.
    #[error("could not resolve authentication protocol from state")]
    UnknownProtocol,

    /// The configured user identifier attribute has no value.
    #[error("user identifier attribute '{0}' is not present in attributes")]
    MissingUserIdentifier(String),
}
