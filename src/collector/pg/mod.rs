//! PostgreSQL data source.
//!
//! Blocking `postgres` client; one `PgSource` per connection. Errors are
//! classified into [`SourceError`] so the session can tell a wrong password
//! from a dropped socket.

mod queries;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use postgres::error::SqlState;
use postgres::{Client, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;
use tracing::debug;

use crate::collector::traits::{FileSystem, RealFs};
use crate::config::{ConnectionParams, SslMode};
use crate::model::{BackendRow, DbStats, LockInfo};
use crate::source::{Connector, DataSource, SourceError};

use queries::{
    ACTIVE_CONNECTIONS_QUERY, build_activities_query, build_blocking_query, build_db_stats_query,
    build_waiting_query,
};

const APPLICATION_NAME: &str = "rpgtop";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// libpq's default socket directory, used when no host is configured.
const DEFAULT_SOCKET_DIR: &str = "/var/run/postgresql";

/// Opens `PgSource` connections.
pub struct PgConnector {
    fs: Arc<dyn FileSystem>,
    proc_path: PathBuf,
}

impl PgConnector {
    pub fn new(proc_path: impl Into<PathBuf>) -> Self {
        Self::with_fs(Arc::new(RealFs::new()), proc_path)
    }

    pub fn with_fs(fs: Arc<dyn FileSystem>, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn config(params: &ConnectionParams, password: Option<&str>) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(params.host.as_deref().unwrap_or(DEFAULT_SOCKET_DIR))
            .port(params.port)
            .user(&params.user)
            .dbname(&params.dbname)
            .application_name(APPLICATION_NAME)
            .connect_timeout(CONNECT_TIMEOUT)
            .ssl_mode(match params.sslmode {
                SslMode::Disable => postgres::config::SslMode::Disable,
                SslMode::Prefer => postgres::config::SslMode::Prefer,
                SslMode::Require => postgres::config::SslMode::Require,
            });
        if let Some(password) = password {
            config.password(password);
        }
        config
    }

    fn tls() -> Result<MakeTlsConnector, SourceError> {
        // Like libpq's `require`, certificates are not verified.
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| SourceError::Connection(format!("TLS setup failed: {}", e)))?;
        Ok(MakeTlsConnector::new(connector))
    }
}

impl Connector for PgConnector {
    type Source = PgSource;

    fn connect(
        &mut self,
        params: &ConnectionParams,
        password: Option<&str>,
    ) -> Result<PgSource, SourceError> {
        let config = Self::config(params, password);
        let result = match params.sslmode {
            SslMode::Disable => config.connect(NoTls),
            SslMode::Prefer | SslMode::Require => config.connect(Self::tls()?),
        };
        let mut client = result.map_err(|e| classify_connect_error(&e))?;

        // Non-fatal: without a version we fall back to the oldest query forms.
        let server_version_num = client
            .query_one("SHOW server_version_num", &[])
            .ok()
            .and_then(|row| row.try_get::<_, String>(0).ok())
            .and_then(|v| v.parse::<i32>().ok());
        debug!("server_version_num: {:?}", server_version_num);

        Ok(PgSource {
            client,
            server_version_num,
            host: params.host.clone(),
            rds_mode: params.rds_mode,
            fs: Arc::clone(&self.fs),
            proc_path: self.proc_path.clone(),
        })
    }
}

/// One open connection.
pub struct PgSource {
    client: Client,
    server_version_num: Option<i32>,
    host: Option<String>,
    rds_mode: bool,
    fs: Arc<dyn FileSystem>,
    proc_path: PathBuf,
}

impl PgSource {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SourceError> {
        match self.client.query(sql, &[]) {
            Ok(rows) => Ok(rows),
            Err(e) => Err(classify_query_error(&e, self.client.is_closed())),
        }
    }

    fn query_one(&mut self, sql: &str) -> Result<Row, SourceError> {
        match self.client.query_one(sql, &[]) {
            Ok(row) => Ok(row),
            Err(e) => Err(classify_query_error(&e, self.client.is_closed())),
        }
    }

    fn backends(&mut self, sql: &str, with_lock: bool) -> Result<Vec<BackendRow>, SourceError> {
        let rows = self.query(sql)?;
        rows.iter()
            .map(|row| backend_row(row, with_lock))
            .collect::<Result<_, _>>()
            .map_err(|e| SourceError::Query(format_postgres_error(&e)))
    }
}

fn backend_row(row: &Row, with_lock: bool) -> Result<BackendRow, postgres::Error> {
    let lock = if with_lock {
        Some(LockInfo {
            mode: row.try_get("lock_mode")?,
            lock_type: row.try_get("lock_type")?,
            relation: row.try_get("relation")?,
        })
    } else {
        None
    };

    Ok(BackendRow {
        pid: row.try_get("pid")?,
        application_name: row.try_get("application_name")?,
        database: row.try_get("datname")?,
        user: row.try_get("usename")?,
        client: row.try_get("client")?,
        duration: row.try_get("duration")?,
        state: row.try_get("state")?,
        wait: row.try_get("wait")?,
        query: row.try_get("query")?,
        lock,
    })
}

impl DataSource for PgSource {
    fn activities(&mut self) -> Result<Vec<BackendRow>, SourceError> {
        let sql = build_activities_query(self.server_version_num);
        self.backends(&sql, false)
    }

    fn waiting(&mut self) -> Result<Vec<BackendRow>, SourceError> {
        let sql = build_waiting_query(self.server_version_num);
        self.backends(&sql, true)
    }

    fn blocking(&mut self) -> Result<Vec<BackendRow>, SourceError> {
        let sql = build_blocking_query(self.server_version_num);
        self.backends(&sql, true)
    }

    fn db_stats(&mut self, skip_sizes: bool) -> Result<DbStats, SourceError> {
        let sql = build_db_stats_query(skip_sizes, self.rds_mode);
        let row = self.query_one(&sql)?;
        let decode = |row: &Row| -> Result<DbStats, postgres::Error> {
            let max_name_length: i32 = row.try_get("max_name_length")?;
            Ok(DbStats {
                xact_total: row.try_get("xact_total")?,
                total_size: row.try_get("total_size")?,
                max_name_length: max_name_length.max(0) as usize,
            })
        };
        decode(&row).map_err(|e| SourceError::Query(format_postgres_error(&e)))
    }

    fn active_connections(&mut self) -> Result<i64, SourceError> {
        let row = self.query_one(ACTIVE_CONNECTIONS_QUERY)?;
        row.try_get(0)
            .map_err(|e| SourceError::Query(format_postgres_error(&e)))
    }

    fn server_identity(&mut self) -> Result<String, SourceError> {
        let row = self.query_one("SHOW server_version")?;
        let version: String = row
            .try_get(0)
            .map_err(|e| SourceError::Query(format_postgres_error(&e)))?;
        Ok(format!("PostgreSQL {}", version))
    }

    fn is_local(&self) -> bool {
        is_local_host(self.host.as_deref(), self.rds_mode)
    }

    fn has_local_access(&mut self) -> Result<bool, SourceError> {
        let row = self.query_one("SELECT pg_backend_pid()")?;
        let pid: i32 = row
            .try_get(0)
            .map_err(|e| SourceError::Query(format_postgres_error(&e)))?;

        let path = self.proc_path.join(pid.to_string()).join("io");
        match self.fs.read_to_string(&path) {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("no local access to backend {}: {}", pid, e);
                Ok(false)
            }
        }
    }
}

/// Returns `true` if `host` designates this machine.
fn is_local_host(host: Option<&str>, rds_mode: bool) -> bool {
    if rds_mode {
        return false;
    }
    match host {
        None => true,
        Some(h) => {
            h.is_empty() || h.starts_with('/') || matches!(h, "localhost" | "127.0.0.1" | "::1")
        }
    }
}

/// Returns `true` for messages signalling that credentials were rejected or
/// are needed.
fn is_auth_message(msg: &str) -> bool {
    msg.contains("password missing") || msg.contains("password authentication failed")
}

fn classify_connect_error(e: &postgres::Error) -> SourceError {
    let msg = format_postgres_error(e);
    if let Some(code) = e.code()
        && (*code == SqlState::INVALID_PASSWORD
            || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION)
    {
        return SourceError::Authentication(msg);
    }
    if is_auth_message(&e.to_string()) {
        return SourceError::Authentication(msg);
    }
    SourceError::Connection(msg)
}

/// Returns `true` for SQLSTATEs reporting that the server ended or refused
/// the session: connection exceptions (class 08) and shutdown or startup
/// of the server (57P01, 57P02, 57P03).
fn ends_session(code: &SqlState) -> bool {
    code.code().starts_with("08")
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CRASH_SHUTDOWN
        || *code == SqlState::CANNOT_CONNECT_NOW
}

fn classify_query_error(e: &postgres::Error, client_closed: bool) -> SourceError {
    let msg = format_postgres_error(e);
    // The FATAL reply can arrive before the client notices the closed socket.
    if client_closed
        || e.is_closed()
        || e.as_db_error().is_none()
        || e.code().is_some_and(ends_session)
    {
        SourceError::Connection(msg)
    } else {
        SourceError::Query(msg)
    }
}

fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}
