//! Resolution of raw authentication state mappings.
//!
//! Two layouts are understood:
//!
//! | Protocol | Identity provider | Service provider |
//! |----------|-------------------|------------------|
//! | SAML 2 | `IdPMetadata` | `Destination` (or `SPMetadata`) |
//! | OpenID Connect | `Oidc.OpenIdProviderMetadata` | `Oidc.RelyingPartyMetadata` |
//!
//! Both carry user attributes under `Attributes`, an optional
//! `AuthnInstant` (unix seconds) and an optional
//! `accounting.ClientIpAddress`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::StateError;
use crate::protocol::Protocol;
use crate::provider::Provider;
use crate::user::parse_attributes;
use crate::CLIENT_IP_ADDRESS_MAX_LENGTH;

/// Protocol-resolved view of a raw state mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// Protocol the authentication used.
    pub protocol: Protocol,
    /// Identity provider that authenticated the user.
    pub identity_provider: Provider,
    /// Service provider the user authenticated to.
    pub service_provider: Provider,
    /// Released user attributes.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// When the authentication happened, if the state recorded it.
    pub authentication_instant: Option<DateTime<Utc>>,
    /// Network address of the client, if captured.
    pub client_ip_address: Option<String>,
}

impl State {
    pub const KEY_ATTRIBUTES: &'static str = "Attributes";
    pub const KEY_AUTHENTICATION_INSTANT: &'static str = "AuthnInstant";
    pub const KEY_ACCOUNTING: &'static str = "accounting";
    pub const KEY_CLIENT_IP_ADDRESS: &'static str = "ClientIpAddress";
    pub const KEY_SAML2_IDP_METADATA: &'static str = "IdPMetadata";
    pub const KEY_SAML2_DESTINATION: &'static str = "Destination";
    pub const KEY_SAML2_SP_METADATA: &'static str = "SPMetadata";
    pub const KEY_OIDC: &'static str = "Oidc";
    pub const KEY_OIDC_OP_METADATA: &'static str = "OpenIdProviderMetadata";
    pub const KEY_OIDC_RP_METADATA: &'static str = "RelyingPartyMetadata";

    /// Resolves a raw state mapping.
    ///
    /// # Errors
    ///
    /// Returns `StateError` when attributes are missing, when neither
    /// protocol layout matches, or when any recognised key has the wrong
    /// shape.
    pub fn from_value(raw: &Value) -> Result<Self, StateError> {
        let object = raw.as_object().ok_or(StateError::InvalidValue {
            key: "state",
            reason: "state must be a map".to_string(),
        })?;

        let attributes = parse_attributes(
            object
                .get(Self::KEY_ATTRIBUTES)
                .ok_or(StateError::MissingKey(Self::KEY_ATTRIBUTES))?,
        )?;

        let (protocol, identity_provider, service_provider) = resolve_providers(object)?;

        Ok(Self {
            protocol,
            identity_provider,
            service_provider,
            attributes,
            authentication_instant: parse_authentication_instant(object)?,
            client_ip_address: parse_client_ip_address(object)?,
        })
    }
}

fn resolve_providers(
    object: &Map<String, Value>,
) -> Result<(Protocol, Provider, Provider), StateError> {
    if let Some(oidc) = object.get(State::KEY_OIDC) {
        let oidc = oidc.as_object().ok_or(StateError::InvalidValue {
            key: State::KEY_OIDC,
            reason: "OIDC state must be a map".to_string(),
        })?;
        let op = metadata_map(oidc, State::KEY_OIDC_OP_METADATA)?
            .ok_or(StateError::MissingKey(State::KEY_OIDC_OP_METADATA))?;
        let rp = metadata_map(oidc, State::KEY_OIDC_RP_METADATA)?
            .ok_or(StateError::MissingKey(State::KEY_OIDC_RP_METADATA))?;

        return Ok((
            Protocol::Oidc,
            Provider::from_metadata(op, Provider::KEY_OIDC_ISSUER)?,
            Provider::from_metadata(rp, Provider::KEY_OIDC_CLIENT_ID)?,
        ));
    }

    let idp = metadata_map(object, State::KEY_SAML2_IDP_METADATA)?;
    let sp = match metadata_map(object, State::KEY_SAML2_DESTINATION)? {
        Some(sp) => Some(sp),
        None => metadata_map(object, State::KEY_SAML2_SP_METADATA)?,
    };

    match (idp, sp) {
        (Some(idp), Some(sp)) => Ok((
            Protocol::Saml2,
            Provider::from_metadata(idp, Provider::KEY_SAML_ENTITY_ID)?,
            Provider::from_metadata(sp, Provider::KEY_SAML_ENTITY_ID)?,
        )),
        (Some(_), None) => Err(StateError::MissingKey(State::KEY_SAML2_DESTINATION)),
        (None, Some(_)) => Err(StateError::MissingKey(State::KEY_SAML2_IDP_METADATA)),
        (None, None) => Err(StateError::UnknownProtocol),
    }
}

fn metadata_map(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<Map<String, Value>>, StateError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(StateError::InvalidValue {
            key,
            reason: "metadata must be a map".to_string(),
        }),
    }
}

fn parse_authentication_instant(
    object: &Map<String, Value>,
) -> Result<Option<DateTime<Utc>>, StateError> {
    let key = State::KEY_AUTHENTICATION_INSTANT;
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let seconds = value.as_i64().ok_or_else(|| StateError::InvalidValue {
                key,
                reason: "authentication instant must be unix seconds".to_string(),
            })?;
            DateTime::from_timestamp(seconds, 0)
                .map(Some)
                .ok_or_else(|| StateError::InvalidValue {
                    key,
                    reason: format!("timestamp {seconds} is out of range"),
                })
        }
    }
}

fn parse_client_ip_address(object: &Map<String, Value>) -> Result<Option<String>, StateError> {
    let key = State::KEY_CLIENT_IP_ADDRESS;
    let Some(accounting) = object.get(State::KEY_ACCOUNTING).and_then(Value::as_object) else {
        return Ok(None);
    };

    match accounting.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(ip)) if ip.len() <= CLIENT_IP_ADDRESS_MAX_LENGTH => {
            Ok(Some(ip.clone()))
        }
        Some(_) => Err(StateError::InvalidValue {
            key,
            reason: format!(
                "client IP address must be a string of at most {CLIENT_IP_ADDRESS_MAX_LENGTH} characters"
            ),
        }),
    }
}
