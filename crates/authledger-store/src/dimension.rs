//! Table-driven helpers shared by the stores for dimension rows.
//!
//! A dimension (identity provider, service provider, user) has a natural
//! key and a JSON payload. Two layouts are supported:
//!
//! - [`VersionedDimension`]: a key table plus an append-only version table.
//!   A new version row is written only when no version of that key has the
//!   same content hash, so identical content is never stored twice.
//! - [`CurrentDimension`]: a single table holding the latest payload per
//!   key, overwritten when the content hash changes.
//!
//! Both are configured with table and column names as data, and produce
//! the migrations that create their tables.

use authledger_db::TableMigration;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::StoreError;
use crate::hashing::{canonical_json, sha256_hex};

/// Row ids resolved for one versioned dimension value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedVersion {
    /// Id of the natural key row.
    pub key_id: i64,
    /// Id of the version row holding the payload.
    pub version_id: i64,
}

/// A natural-key table with an append-only `_version` table.
#[derive(Debug, Clone)]
pub(crate) struct VersionedDimension {
    prefix: String,
    name: &'static str,
    key_column: &'static str,
    payload_column: &'static str,
}

impl VersionedDimension {
    pub(crate) fn new(
        prefix: &str,
        name: &'static str,
        key_column: &'static str,
        payload_column: &'static str,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            name,
            key_column,
            payload_column,
        }
    }

    pub(crate) fn table(&self) -> String {
        format!("{}{}", self.prefix, self.name)
    }

    pub(crate) fn version_table(&self) -> String {
        format!("{}{}_version", self.prefix, self.name)
    }

    /// Column in the version table referencing the key table.
    pub(crate) fn foreign_key_column(&self) -> String {
        format!("{}_id", self.name)
    }

    fn hash_column(&self) -> String {
        format!("{}_hash_sha256", self.payload_column)
    }

    /// Migrations creating the key table (at `version`) and the version
    /// table (at `version + 100`).
    pub(crate) fn migrations(&self, version: u64) -> Vec<TableMigration> {
        let key = self.key_column;
        let payload = self.payload_column;
        let hash = self.hash_column();
        let fk = self.foreign_key_column();

        vec![
            TableMigration::new(
                version,
                &self.prefix,
                self.name,
                &format!(
                    "id INTEGER PRIMARY KEY AUTOINCREMENT,
                     {key} TEXT NOT NULL UNIQUE,
                     created_at TEXT NOT NULL"
                ),
            ),
            TableMigration::new(
                version + 100,
                &self.prefix,
                &format!("{}_version", self.name),
                &format!(
                    "id INTEGER PRIMARY KEY AUTOINCREMENT,
                     {fk} INTEGER NOT NULL,
                     {payload} TEXT NOT NULL,
                     {hash} TEXT NOT NULL,
                     created_at TEXT NOT NULL,
                     UNIQUE ({fk}, {hash}),
                     FOREIGN KEY ({fk}) REFERENCES {{prefix}}{name}(id)",
                    name = self.name
                ),
            ),
        ]
    }

    /// Finds or creates the key row and the version row matching `payload`.
    ///
    /// Must run inside the caller's transaction.
    pub(crate) fn resolve(
        &self,
        conn: &Connection,
        key: &str,
        payload: &Value,
        now: &str,
    ) -> Result<ResolvedVersion, StoreError> {
        let table = self.table();
        let version_table = self.version_table();
        let key_column = self.key_column;
        let payload_column = self.payload_column;
        let hash_column = self.hash_column();
        let fk = self.foreign_key_column();

        conn.prepare_cached(&format!(
            "INSERT INTO {table} ({key_column}, created_at) VALUES (?1, ?2)
             ON CONFLICT ({key_column}) DO NOTHING"
        ))?
        .execute(params![key, now])?;

        let key_id: i64 = conn
            .prepare_cached(&format!("SELECT id FROM {table} WHERE {key_column} = ?1"))?
            .query_row([key], |row| row.get(0))?;

        let content = canonical_json(payload);
        let hash = sha256_hex(&content);

        let inserted = conn
            .prepare_cached(&format!(
                "INSERT INTO {version_table} ({fk}, {payload_column}, {hash_column}, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT ({fk}, {hash_column}) DO NOTHING"
            ))?
            .execute(params![key_id, content, hash, now])?;

        let version_id: i64 = conn
            .prepare_cached(&format!(
                "SELECT id FROM {version_table} WHERE {fk} = ?1 AND {hash_column} = ?2"
            ))?
            .query_row(params![key_id, hash], |row| row.get(0))?;

        if inserted > 0 {
            tracing::debug!(table = %version_table, key, version_id, "recorded new version");
        }

        Ok(ResolvedVersion {
            key_id,
            version_id,
        })
    }
}

/// A natural-key table holding only the latest payload.
#[derive(Debug, Clone)]
pub(crate) struct CurrentDimension {
    prefix: String,
    name: &'static str,
    key_column: &'static str,
    payload_column: &'static str,
}

impl CurrentDimension {
    pub(crate) fn new(
        prefix: &str,
        name: &'static str,
        key_column: &'static str,
        payload_column: &'static str,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            name,
            key_column,
            payload_column,
        }
    }

    pub(crate) fn table(&self) -> String {
        format!("{}{}", self.prefix, self.name)
    }

    fn hash_column(&self) -> String {
        format!("{}_hash_sha256", self.payload_column)
    }

    pub(crate) fn migration(&self, version: u64) -> TableMigration {
        let key = self.key_column;
        let payload = self.payload_column;
        let hash = self.hash_column();

        TableMigration::new(
            version,
            &self.prefix,
            self.name,
            &format!(
                "id INTEGER PRIMARY KEY AUTOINCREMENT,
                 {key} TEXT NOT NULL UNIQUE,
                 {payload} TEXT NOT NULL,
                 {hash} TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL"
            ),
        )
    }

    /// Inserts the key with `payload`, or replaces the stored payload when
    /// its hash differs. Returns the row id.
    ///
    /// Must run inside the caller's transaction.
    pub(crate) fn upsert(
        &self,
        conn: &Connection,
        key: &str,
        payload: &Value,
        now: &str,
    ) -> Result<i64, StoreError> {
        let table = self.table();
        let key_column = self.key_column;
        let payload_column = self.payload_column;
        let hash_column = self.hash_column();

        let content = canonical_json(payload);
        let hash = sha256_hex(&content);

        conn.prepare_cached(&format!(
            "INSERT INTO {table} ({key_column}, {payload_column}, {hash_column}, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT ({key_column}) DO UPDATE SET
                {payload_column} = excluded.{payload_column},
                {hash_column} = excluded.{hash_column},
                updated_at = excluded.updated_at
             WHERE {hash_column} != excluded.{hash_column}"
        ))?
        .execute(params![key, content, hash, now])?;

        let id = conn
            .prepare_cached(&format!("SELECT id FROM {table} WHERE {key_column} = ?1"))?
            .query_row([key], |row| row.get(0))
            .optional()?;

        id.ok_or_else(|| StoreError::Validation {
            column: key_column.to_string(),
            reason: format!("row for key in {table} vanished after upsert"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authledger_db::{run_migrations, Migration};
    use serde_json::json;

    fn setup(dimension: &VersionedDimension) -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let migrations: Vec<Box<dyn Migration>> = dimension
            .migrations(20220801000100)
            .into_iter()
            .map(|m| Box::new(m) as Box<dyn Migration>)
            .collect();
        run_migrations(&conn, &migrations).expect("migrations should succeed");
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("should count rows")
    }

    #[test]
    fn identical_payload_reuses_version() {
        let dimension = VersionedDimension::new("t_", "sp", "entity_id", "metadata");
        let conn = setup(&dimension);

        let first = dimension
            .resolve(&conn, "sp-1", &json!({"name": "A"}), "2022-08-01 00:00:00.000000")
            .expect("resolve should succeed");
        let second = dimension
            .resolve(&conn, "sp-1", &json!({"name": "A"}), "2022-08-02 00:00:00.000000")
            .expect("resolve should succeed");

        assert_eq!(first, second);
        assert_eq!(count(&conn, "t_sp"), 1);
        assert_eq!(count(&conn, "t_sp_version"), 1);
    }

    #[test]
    fn changed_payload_appends_version_and_reverting_reuses_old_one() {
        let dimension = VersionedDimension::new("t_", "sp", "entity_id", "metadata");
        let conn = setup(&dimension);
        let now = "2022-08-01 00:00:00.000000";

        let a = dimension
            .resolve(&conn, "sp-1", &json!({"name": "A"}), now)
            .expect("resolve should succeed");
        let b = dimension
            .resolve(&conn, "sp-1", &json!({"name": "B"}), now)
            .expect("resolve should succeed");
        let a_again = dimension
            .resolve(&conn, "sp-1", &json!({"name": "A"}), now)
            .expect("resolve should succeed");

        assert_eq!(a.key_id, b.key_id);
        assert_ne!(a.version_id, b.version_id);
        assert_eq!(a, a_again);
        assert_eq!(count(&conn, "t_sp_version"), 2);
    }

    #[test]
    fn current_dimension_overwrites_payload() {
        let dimension = CurrentDimension::new("t_", "sp", "entity_id", "metadata");
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        dimension
            .migration(20220801000100)
            .run(&conn)
            .expect("migration should succeed");

        let id = dimension
            .upsert(&conn, "sp-1", &json!({"name": "A"}), "2022-08-01 00:00:00.000000")
            .expect("upsert should succeed");
        let same = dimension
            .upsert(&conn, "sp-1", &json!({"name": "B"}), "2022-08-02 00:00:00.000000")
            .expect("upsert should succeed");

        assert_eq!(id, same);
        let (metadata, updated_at): (String, String) = conn
            .query_row(
                "SELECT metadata, updated_at FROM t_sp WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("should read row");
        assert_eq!(metadata, r#"{"name":"B"}"#);
        assert_eq!(updated_at, "2022-08-02 00:00:00.000000");
        assert_eq!(count(&conn, "t_sp"), 1);
    }
}
