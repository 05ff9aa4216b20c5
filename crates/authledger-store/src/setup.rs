//! Schema setup shared by the stores.

use authledger_db::{Connections, Migration, Migrator};

use crate::error::StoreError;

/// Whether any of `migrations` still has to be applied.
pub(crate) fn needs_setup(
    connections: &Connections,
    migrations: &[Box<dyn Migration>],
) -> Result<bool, StoreError> {
    let conn = connections.writer()?;
    let migrator = Migrator::new(&conn);

    if migrator.needs_setup()? {
        return Ok(true);
    }

    Ok(!migrator.pending(migrations)?.is_empty())
}

/// Applies pending `migrations`, warning and doing nothing when the schema
/// is already current.
pub(crate) fn run_setup(
    connections: &Connections,
    store: &'static str,
    migrations: &[Box<dyn Migration>],
) -> Result<(), StoreError> {
    if !needs_setup(connections, migrations)? {
        tracing::warn!(store, "setup requested but schema is already current");
        return Ok(());
    }

    let conn = connections.writer()?;
    let applied = Migrator::new(&conn).run_pending(migrations)?;
    tracing::info!(store, applied, "store setup complete");

    Ok(())
}
