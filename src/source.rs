//! Contracts between the poll loop and the database.
//!
//! `Connector` opens connections, `DataSource` is one open connection. The
//! PostgreSQL implementation lives in `collector::pg`; tests use in-memory
//! doubles.

use crate::config::ConnectionParams;
use crate::model::{BackendRow, DbStats};

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Server rejected the credentials, or asked for a password we lack.
    Authentication(String),
    /// Transport failure: refused, reset, closed.
    Connection(String),
    /// Statement failed on a healthy connection.
    Query(String),
    /// Call attempted without a connected session.
    NotConnected,
}

impl SourceError {
    /// Returns `true` for failures that the reconnect procedure handles.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, SourceError::Connection(_) | SourceError::NotConnected)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Authentication(msg) => write!(f, "authentication failed: {}", msg),
            SourceError::Connection(msg) => write!(f, "connection failed: {}", msg),
            SourceError::Query(msg) => write!(f, "query error: {}", msg),
            SourceError::NotConnected => write!(f, "not connected"),
        }
    }
}

impl std::error::Error for SourceError {}

/// One open connection to the monitored server.
pub trait DataSource {
    /// Non-idle backends, excluding our own.
    fn activities(&mut self) -> Result<Vec<BackendRow>, SourceError>;

    /// Backends waiting for a lock.
    fn waiting(&mut self) -> Result<Vec<BackendRow>, SourceError>;

    /// Backends holding a lock that others wait for.
    fn blocking(&mut self) -> Result<Vec<BackendRow>, SourceError>;

    /// Cumulative database counters. With `skip_sizes` the size
    /// computation is not run and `total_size` is `None`.
    fn db_stats(&mut self, skip_sizes: bool) -> Result<DbStats, SourceError>;

    /// Number of backends in state `active`.
    fn active_connections(&mut self) -> Result<i64, SourceError>;

    /// Server version banner.
    fn server_identity(&mut self) -> Result<String, SourceError>;

    /// Returns `true` if the server runs on this host.
    fn is_local(&self) -> bool;

    /// Returns `true` if the server's backend processes are readable by the
    /// current OS user.
    fn has_local_access(&mut self) -> Result<bool, SourceError>;
}

/// Opens data source connections.
pub trait Connector {
    type Source: DataSource;

    fn connect(
        &mut self,
        params: &ConnectionParams,
        password: Option<&str>,
    ) -> Result<Self::Source, SourceError>;
}
