//! Role-split access to the master and (optional) slave pools.

use serde::Deserialize;

use crate::pool::{DbPool, PoolError, PooledConnection};

/// Which pool a component reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Read/write connection to the primary database.
    Master,
    /// Read-only connection, possibly to a replica.
    Slave,
}

impl ConnectionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Slave => "slave",
        }
    }
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pools owned by the connection layer.
///
/// Cloning is cheap; both pools are reference counted.
#[derive(Debug, Clone)]
pub struct Connections {
    master: DbPool,
    slave: Option<DbPool>,
}

impl Connections {
    /// Connections with only a master pool. Reads use master.
    pub fn new(master: DbPool) -> Self {
        Self {
            master,
            slave: None,
        }
    }

    /// Connections with a separate read pool.
    pub fn with_slave(master: DbPool, slave: DbPool) -> Self {
        Self {
            master,
            slave: Some(slave),
        }
    }

    /// Whether a dedicated slave pool is configured.
    pub fn has_slave(&self) -> bool {
        self.slave.is_some()
    }

    /// The pool serving `role`. `Slave` falls back to master when no slave
    /// pool is configured.
    pub fn pool(&self, role: ConnectionRole) -> &DbPool {
        match (role, &self.slave) {
            (ConnectionRole::Slave, Some(slave)) => slave,
            _ => &self.master,
        }
    }

    /// Checks out a connection for writing.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if no connection becomes available.
    pub fn writer(&self) -> Result<PooledConnection, PoolError> {
        Ok(self.master.get()?)
    }

    /// Checks out a connection for reading, preferring the slave pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if no connection becomes available.
    pub fn reader(&self) -> Result<PooledConnection, PoolError> {
        Ok(self.pool(ConnectionRole::Slave).get()?)
    }
}
