//! Connected service read results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::Provider;
use crate::user::User;

/// A service provider a user has authenticated to at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedService {
    /// The service provider, with its latest known metadata.
    pub service_provider: Provider,
    /// How many authentications to this service provider are on record.
    pub number_of_authentications: u64,
    pub first_authentication_at: DateTime<Utc>,
    pub last_authentication_at: DateTime<Utc>,
    /// The user as last released to this service provider.
    pub user: User,
}

/// Connected services keyed by service provider entity ID.
///
/// Adding a service for an entity ID that is already present replaces the
/// earlier entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedServiceBag {
    services: BTreeMap<String, ConnectedService>,
}

impl ConnectedServiceBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_replace(&mut self, service: ConnectedService) {
        self.services
            .insert(service.service_provider.entity_id.clone(), service);
    }

    pub fn get(&self, entity_id: &str) -> Option<&ConnectedService> {
        self.services.get(entity_id)
    }

    /// Iterates services ordered by entity ID.
    pub fn all(&self) -> impl Iterator<Item = &ConnectedService> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn service(entity_id: &str, count: u64) -> ConnectedService {
        let now = Utc::now();
        ConnectedService {
            service_provider: Provider {
                entity_id: entity_id.to_string(),
                metadata: Map::new(),
            },
            number_of_authentications: count,
            first_authentication_at: now,
            last_authentication_at: now,
            user: User {
                identifier: "jdoe".to_string(),
                attributes: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn add_or_replace_keeps_one_entry_per_entity_id() {
        let mut bag = ConnectedServiceBag::new();
        bag.add_or_replace(service("sp-1", 1));
        bag.add_or_replace(service("sp-2", 1));
        bag.add_or_replace(service("sp-1", 5));

        assert_eq!(bag.len(), 2);
        assert_eq!(
            bag.get("sp-1").map(|s| s.number_of_authentications),
            Some(5)
        );
    }
}
