//! Recent activity read results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;
use crate::provider::Provider;
use crate::user::User;

/// One recorded authentication, as shown in a user's activity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Service provider the user authenticated to, with the metadata known
    /// at the time.
    pub service_provider: Provider,
    /// The user as released at the time of authentication.
    pub user: User,
    pub happened_at: DateTime<Utc>,
    pub client_ip_address: Option<String>,
    pub protocol: Protocol,
}

/// Ordered collection of activities, newest first as returned by stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityBag {
    activities: Vec<Activity>,
}

impl ActivityBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, activity: Activity) {
        self.activities.push(activity);
    }

    pub fn all(&self) -> &[Activity] {
        &self.activities
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl IntoIterator for ActivityBag {
    type Item = Activity;
    type IntoIter = std::vec::IntoIter<Activity>;

    fn into_iter(self) -> Self::IntoIter {
        self.activities.into_iter()
    }
}

impl FromIterator<Activity> for ActivityBag {
    fn from_iter<I: IntoIterator<Item = Activity>>(iter: I) -> Self {
        Self {
            activities: iter.into_iter().collect(),
        }
    }
}
