use authledger_db::{Migration, TableMigration};

use crate::dimension::VersionedDimension;

/// Prefix of every versioned store table.
pub const TABLE_PREFIX: &str = "vds_";

pub(super) const TABLE_IDP_SP_USER_VERSION: &str = "vds_idp_sp_user_version";
pub(super) const TABLE_AUTHENTICATION_EVENT: &str = "vds_authentication_event";

/// Dimension layout of the versioned store.
#[derive(Debug, Clone)]
pub(super) struct Schema {
    pub idp: VersionedDimension,
    pub sp: VersionedDimension,
    pub user: VersionedDimension,
}

impl Schema {
    pub(super) fn new() -> Self {
        Self {
            idp: VersionedDimension::new(TABLE_PREFIX, "idp", "entity_id", "metadata"),
            sp: VersionedDimension::new(TABLE_PREFIX, "sp", "entity_id", "metadata"),
            user: VersionedDimension::new(TABLE_PREFIX, "user", "identifier", "attributes"),
        }
    }

    /// Every migration of the versioned store, dimensions first.
    pub(super) fn migrations(&self) -> Vec<Box<dyn Migration>> {
        let mut migrations: Vec<Box<dyn Migration>> = Vec::new();

        for (dimension, version) in [
            (&self.idp, 20220801000100),
            (&self.sp, 20220801000300),
            (&self.user, 20220801000500),
        ] {
            for migration in dimension.migrations(version) {
                migrations.push(Box::new(migration));
            }
        }

        migrations.push(Box::new(TableMigration::new(
            20220801000700,
            TABLE_PREFIX,
            "idp_sp_user_version",
            "id INTEGER PRIMARY KEY AUTOINCREMENT,
             idp_version_id INTEGER NOT NULL,
             sp_version_id INTEGER NOT NULL,
             user_version_id INTEGER NOT NULL,
             created_at TEXT NOT NULL,
             UNIQUE (idp_version_id, sp_version_id, user_version_id),
             FOREIGN KEY (idp_version_id) REFERENCES {prefix}idp_version(id),
             FOREIGN KEY (sp_version_id) REFERENCES {prefix}sp_version(id),
             FOREIGN KEY (user_version_id) REFERENCES {prefix}user_version(id)",
        )));

        migrations.push(Box::new(
            TableMigration::new(
                20220801000800,
                TABLE_PREFIX,
                "authentication_event",
                "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 idp_sp_user_version_id INTEGER NOT NULL,
                 happened_at TEXT NOT NULL,
                 client_ip_address VARCHAR(45),
                 authentication_protocol_designation VARCHAR(16),
                 created_at TEXT NOT NULL,
                 FOREIGN KEY (idp_sp_user_version_id) REFERENCES {prefix}idp_sp_user_version(id)",
            )
            .with_index("happened_at", "happened_at")
            .with_index("idp_sp_user_version_id", "idp_sp_user_version_id"),
        ));

        migrations
    }
}
