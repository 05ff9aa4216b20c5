//! Reversible schema migrations and the migrator that tracks them.
//!
//! A [`Migration`] knows how to move the schema forward (`run`) and back
//! (`revert`). Both directions check the current schema first, so calling
//! either one against a schema already in the target state does nothing.
//!
//! The [`Migrator`] records applied migrations by name in
//! [`TRACKING_TABLE`], applies pending ones in version order, and never
//! applies the same migration twice.

use rusqlite::{params, Connection};
use thiserror::Error;

/// Name of the table recording applied migrations.
pub const TRACKING_TABLE: &str = "authledger_migrations";

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),

    /// A migration was configured with a table name that is not a plain
    /// SQL identifier.
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
}

/// A single forward/backward schema change.
pub trait Migration: Send + Sync {
    /// Timestamp-based version stamp (`YYYYMMDDhhmmss`). Pending migrations
    /// are applied in ascending version order.
    fn version(&self) -> u64;

    /// Unique name used in the tracking table.
    fn name(&self) -> &str;

    /// Applies the change. A no-op if the schema already has it.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` wrapping the underlying cause.
    fn run(&self, conn: &Connection) -> Result<(), MigrationError>;

    /// Removes the change. A no-op if the schema does not have it.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` wrapping the underlying cause.
    fn revert(&self, conn: &Connection) -> Result<(), MigrationError>;
}

/// Creates one table (plus its indexes) on `run` and drops it on `revert`.
///
/// The table definition may reference sibling tables through the `{prefix}`
/// placeholder, which is replaced by the store's table prefix.
#[derive(Debug, Clone)]
pub struct TableMigration {
    version: u64,
    name: String,
    table: String,
    definition: String,
    indexes: Vec<(String, String)>,
}

impl TableMigration {
    /// Describes the creation of `{prefix}{table}`.
    ///
    /// `definition` is the column and constraint list that goes between the
    /// parentheses of `CREATE TABLE`.
    pub fn new(version: u64, prefix: &str, table: &str, definition: &str) -> Self {
        let table = format!("{prefix}{table}");
        Self {
            version,
            name: format!("{version}_create_{table}"),
            definition: definition.replace("{prefix}", prefix),
            table,
            indexes: Vec::new(),
        }
    }

    /// Adds an index over `columns` (a comma separated column list).
    pub fn with_index(mut self, suffix: &str, columns: &str) -> Self {
        let index = format!("{}_{suffix}_idx", self.table);
        self.indexes.push((index, columns.to_string()));
        self
    }

    /// The fully prefixed table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn failed(&self, source: rusqlite::Error) -> MigrationError {
        MigrationError::ExecutionFailed {
            name: self.name.clone(),
            source,
        }
    }
}

impl Migration for TableMigration {
    fn version(&self) -> u64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, conn: &Connection) -> Result<(), MigrationError> {
        validate_identifier(&self.table)?;

        if table_exists(conn, &self.table).map_err(MigrationError::StateQuery)? {
            tracing::debug!(table = %self.table, "table already exists, skipping create");
            return Ok(());
        }

        let mut sql = format!("CREATE TABLE {} ({});", self.table, self.definition);
        for (index, columns) in &self.indexes {
            validate_identifier(index)?;
            sql.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS {index} ON {} ({columns});",
                self.table
            ));
        }

        conn.execute_batch(&sql).map_err(|e| self.failed(e))?;
        tracing::debug!(table = %self.table, "created table");

        Ok(())
    }

    fn revert(&self, conn: &Connection) -> Result<(), MigrationError> {
        validate_identifier(&self.table)?;

        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", self.table))
            .map_err(|e| self.failed(e))?;
        tracing::debug!(table = %self.table, "dropped table");

        Ok(())
    }
}

/// Returns whether a table with the given name exists.
///
/// # Errors
///
/// Returns the SQLite error if `sqlite_master` cannot be queried.
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )
}

fn validate_identifier(name: &str) -> Result<(), MigrationError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(MigrationError::InvalidTableName(name.to_string()))
    }
}

/// Applies and reverts migrations against one connection, recording state in
/// [`TRACKING_TABLE`].
pub struct Migrator<'c> {
    conn: &'c Connection,
}

impl<'c> Migrator<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Whether the tracking table is missing.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::StateQuery` if the schema cannot be queried.
    pub fn needs_setup(&self) -> Result<bool, MigrationError> {
        table_exists(self.conn, TRACKING_TABLE)
            .map(|exists| !exists)
            .map_err(MigrationError::StateQuery)
    }

    /// Creates the tracking table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::ExecutionFailed` if the table cannot be created.
    pub fn run_setup(&self) -> Result<(), MigrationError> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {TRACKING_TABLE} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    version INTEGER NOT NULL,
                    name TEXT NOT NULL UNIQUE,
                    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f000', 'now'))
                );"
            ))
            .map_err(|e| MigrationError::ExecutionFailed {
                name: format!("{TRACKING_TABLE}_bootstrap"),
                source: e,
            })
    }

    /// Whether `migration` is recorded as applied.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::StateQuery` on SQL failure.
    pub fn is_applied(&self, migration: &dyn Migration) -> Result<bool, MigrationError> {
        if self.needs_setup()? {
            return Ok(false);
        }

        self.conn
            .query_row(
                &format!("SELECT COUNT(*) > 0 FROM {TRACKING_TABLE} WHERE name = ?1"),
                [migration.name()],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)
    }

    /// Migrations from `migrations` that have not been applied yet, in the
    /// order they would be applied.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::StateQuery` on SQL failure.
    pub fn pending<'m>(
        &self,
        migrations: &'m [Box<dyn Migration>],
    ) -> Result<Vec<&'m dyn Migration>, MigrationError> {
        let mut pending = Vec::new();
        for migration in migrations {
            if !self.is_applied(migration.as_ref())? {
                pending.push(migration.as_ref());
            }
        }
        pending.sort_by(|a, b| (a.version(), a.name()).cmp(&(b.version(), b.name())));

        Ok(pending)
    }

    /// Applies every pending migration, each in its own transaction together
    /// with its tracking record. Returns how many were recorded by this call.
    ///
    /// A migration recorded by a concurrent setup in the meantime is
    /// skipped rather than reported as a conflict.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` from the first migration that fails; earlier
    /// migrations stay applied.
    pub fn run_pending(&self, migrations: &[Box<dyn Migration>]) -> Result<usize, MigrationError> {
        self.run_setup()?;

        let mut applied = 0;
        for migration in self.pending(migrations)? {
            let name = migration.name().to_string();
            let failed = |source| MigrationError::ExecutionFailed {
                name: name.clone(),
                source,
            };

            tracing::info!(migration = %name, "applying migration");

            let tx = self.conn.unchecked_transaction().map_err(failed)?;
            migration.run(&tx)?;
            let recorded = tx
                .execute(
                    &format!(
                        "INSERT OR IGNORE INTO {TRACKING_TABLE} (version, name) VALUES (?1, ?2)"
                    ),
                    params![migration.version() as i64, name],
                )
                .map_err(failed)?;
            tx.commit().map_err(failed)?;

            if recorded == 0 {
                tracing::debug!(migration = %name, "migration already recorded by another setup");
            } else {
                applied += 1;
            }
        }

        Ok(applied)
    }

    /// Reverts one migration and removes its tracking record.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the revert or the bookkeeping fails.
    pub fn revert(&self, migration: &dyn Migration) -> Result<(), MigrationError> {
        let name = migration.name().to_string();
        let failed = |source| MigrationError::ExecutionFailed {
            name: name.clone(),
            source,
        };

        tracing::info!(migration = %name, "reverting migration");

        let tx = self.conn.unchecked_transaction().map_err(failed)?;
        migration.revert(&tx)?;
        if !self.needs_setup()? {
            tx.execute(
                &format!("DELETE FROM {TRACKING_TABLE} WHERE name = ?1"),
                [&name],
            )
            .map_err(failed)?;
        }
        tx.commit().map_err(failed)?;

        Ok(())
    }
}

/// Sets up tracking and applies every pending migration in `migrations`.
///
/// # Errors
///
/// Returns `MigrationError` if the tracking table cannot be created or any
/// migration fails.
pub fn run_migrations(
    conn: &Connection,
    migrations: &[Box<dyn Migration>],
) -> Result<usize, MigrationError> {
    Migrator::new(conn).run_pending(migrations)
}
