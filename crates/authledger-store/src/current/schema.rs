use authledger_db::{Migration, TableMigration};

use crate::dimension::{CurrentDimension, VersionedDimension};

/// Prefix of every current-view store table.
pub const TABLE_PREFIX: &str = "cds_";

pub(super) const TABLE_CONNECTED_SERVICE: &str = "cds_connected_service";
pub(super) const TABLE_AUTHENTICATION_EVENT: &str = "cds_authentication_event";

#[derive(Debug, Clone)]
pub(super) struct Schema {
    pub sp: CurrentDimension,
    pub user: VersionedDimension,
}

impl Schema {
    pub(super) fn new() -> Self {
        Self {
            sp: CurrentDimension::new(TABLE_PREFIX, "sp", "entity_id", "metadata"),
            user: VersionedDimension::new(TABLE_PREFIX, "user", "identifier", "attributes"),
        }
    }

    pub(super) fn migrations(&self) -> Vec<Box<dyn Migration>> {
        let mut migrations: Vec<Box<dyn Migration>> =
            vec![Box::new(self.sp.migration(20220801000100))];

        for migration in self.user.migrations(20220801000200) {
            migrations.push(Box::new(migration));
        }

        migrations.push(Box::new(
            TableMigration::new(
                20220801000400,
                TABLE_PREFIX,
                "connected_service",
                "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 sp_id INTEGER NOT NULL,
                 user_id INTEGER NOT NULL,
                 user_version_id INTEGER NOT NULL,
                 first_authentication_at TEXT NOT NULL,
                 last_authentication_at TEXT NOT NULL,
                 count_of_authentication_events INTEGER NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL,
                 UNIQUE (sp_id, user_id),
                 FOREIGN KEY (sp_id) REFERENCES {prefix}sp(id),
                 FOREIGN KEY (user_id) REFERENCES {prefix}user(id),
                 FOREIGN KEY (user_version_id) REFERENCES {prefix}user_version(id)",
            )
            .with_index("user_id", "user_id"),
        ));

        migrations.push(Box::new(
            TableMigration::new(
                20220801000500,
                TABLE_PREFIX,
                "authentication_event",
                "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 sp_id INTEGER NOT NULL,
                 user_version_id INTEGER NOT NULL,
                 happened_at TEXT NOT NULL,
                 client_ip_address VARCHAR(45),
                 authentication_protocol_designation VARCHAR(16),
                 created_at TEXT NOT NULL,
                 FOREIGN KEY (sp_id) REFERENCES {prefix}sp(id),
                 FOREIGN KEY (user_version_id) REFERENCES {prefix}user_version(id)",
            )
            .with_index("happened_at", "happened_at")
            .with_index("user_version_id", "user_version_id"),
        ));

        migrations
    }
}
