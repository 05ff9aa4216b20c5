//! End user identity and attributes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StateError;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Persistent identifier, taken from the configured identifier attribute.
    pub identifier: String,
    /// Released attributes, multi-valued, keyed by attribute name.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl User {
    /// Creates a user whose identifier is the first value of
    /// `identifier_attribute`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingUserIdentifier` if the attribute is absent
    /// or has no values.
    pub fn from_attributes(
        attributes: BTreeMap<String, Vec<String>>,
        identifier_attribute: &str,
    ) -> Result<Self, StateError> {
        let identifier = attributes
            .get(identifier_attribute)
            .and_then(|values| values.first())
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| StateError::MissingUserIdentifier(identifier_attribute.to_string()))?;

        Ok(Self {
            identifier,
            attributes,
        })
    }

    /// Returns the first value of the named attribute.
    pub fn first_attribute_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Parses an attribute map. Each attribute is a list of scalars or a single
/// scalar; scalars other than strings are rendered to text.
pub(crate) fn parse_attributes(
    raw: &Value,
) -> Result<BTreeMap<String, Vec<String>>, StateError> {
    let invalid = |reason: String| StateError::InvalidValue {
        key: crate::state::State::KEY_ATTRIBUTES,
        reason,
    };

    let object = raw
        .as_object()
        .ok_or_else(|| invalid("attributes must be a map".to_string()))?;

    let mut attributes = BTreeMap::new();
    for (name, value) in object {
        let non_scalar = || invalid(format!("attribute '{name}' has a non-scalar value"));
        let values = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(non_scalar))
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![scalar_to_string(other).ok_or_else(non_scalar)?],
        };
        attributes.insert(name.clone(), values);
    }

    Ok(attributes)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
