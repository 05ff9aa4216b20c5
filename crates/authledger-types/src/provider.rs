//! Identity and service provider metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StateError;

/// An identity provider or a service provider, identified by its entity ID
/// and carrying the metadata it was known by at authentication time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Natural key of the provider (SAML entity ID, OIDC issuer or client ID).
    pub entity_id: String,
    /// Raw metadata as supplied in the authentication state.
    pub metadata: Map<String, Value>,
}

impl Provider {
    /// Metadata key holding a SAML entity ID.
    pub const KEY_SAML_ENTITY_ID: &'static str = "entityid";
    /// Metadata key holding an OpenID provider issuer.
    pub const KEY_OIDC_ISSUER: &'static str = "issuer";
    /// Metadata key holding a relying party client ID.
    pub const KEY_OIDC_CLIENT_ID: &'static str = "id";

    /// Builds a provider from its metadata, reading the entity ID from
    /// `entity_id_key`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::InvalidValue` if the entity ID is absent, empty,
    /// or not a string.
    pub fn from_metadata(
        metadata: Map<String, Value>,
        entity_id_key: &'static str,
    ) -> Result<Self, StateError> {
        let entity_id = match metadata.get(entity_id_key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => {
                return Err(StateError::InvalidValue {
                    key: entity_id_key,
                    reason: "provider entity ID must be a non-empty string".to_string(),
                })
            }
        };

        Ok(Self {
            entity_id,
            metadata,
        })
    }

    /// Human readable name, falling back to the entity ID.
    ///
    /// Metadata may carry `name` either as a plain string or as a map of
    /// language tag to string; `locale` is tried first, then `en`, then any.
    pub fn name(&self, locale: &str) -> &str {
        self.localized("name", locale).unwrap_or(&self.entity_id)
    }

    /// Human readable description, if the metadata has one.
    pub fn description(&self, locale: &str) -> Option<&str> {
        self.localized("description", locale)
    }

    fn localized(&self, key: &str, locale: &str) -> Option<&str> {
        match self.metadata.get(key)? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(translations) => translations
                .get(locale)
                .or_else(|| translations.get("en"))
                .or_else(|| translations.values().next())
                .and_then(Value::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test metadata must be an object"),
        }
    }

    #[test]
    fn from_metadata_reads_entity_id() {
        let provider = Provider::from_metadata(
            metadata(json!({"entityid": "https://idp.example.org", "name": "Example IdP"})),
            Provider::KEY_SAML_ENTITY_ID,
        )
        .expect("provider should parse");

        assert_eq!(provider.entity_id, "https://idp.example.org");
        assert_eq!(provider.name("en"), "Example IdP");
    }

    #[test]
    fn from_metadata_rejects_missing_entity_id() {
        let err = Provider::from_metadata(metadata(json!({"name": "x"})), "entityid")
            .expect_err("missing entity id should fail");
        assert!(matches!(err, StateError::InvalidValue { key: "entityid", .. }));
    }

    #[test]
    fn localized_name_falls_back() {
        let provider = Provider::from_metadata(
            metadata(json!({
                "entityid": "sp",
                "name": {"hr": "Usluga", "en": "Service"},
                "description": {"de": "Dienst"}
            })),
            "entityid",
        )
        .expect("provider should parse");

        assert_eq!(provider.name("hr"), "Usluga");
        assert_eq!(provider.name("fr"), "Service");
        assert_eq!(provider.description("fr"), Some("Dienst"));

        let bare = Provider::from_metadata(metadata(json!({"entityid": "bare"})), "entityid")
            .expect("provider should parse");
        assert_eq!(bare.name("en"), "bare");
        assert_eq!(bare.description("en"), None);
    }
}
