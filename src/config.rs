//! Startup configuration.
//!
//! Connection parameters are resolved once, in this order:
//! command line, libpq service file section, `PG*` environment variables,
//! built-in defaults. The result is immutable for the rest of the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound for the refresh delay.
pub const REFRESH_MIN: Duration = Duration::from_millis(500);
/// Upper bound for the refresh delay.
pub const REFRESH_MAX: Duration = Duration::from_secs(5);
/// Step used by the `+`/`-` keys.
pub const REFRESH_STEP: Duration = Duration::from_millis(500);

const DEFAULT_PORT: u16 = 5432;

/// Error type for configuration resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No user name in arguments, service, `PGUSER` or `USER`.
    MissingUser,
    /// Port is not a number in 1..=65535.
    InvalidPort(String),
    /// Service file missing, unreadable, or without the named section.
    Service(String),
    /// Unknown `sslmode` value.
    InvalidSslMode(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingUser => write!(f, "no user name given (set PGUSER or use -U)"),
            ConfigError::InvalidPort(p) => write!(f, "invalid port '{}'", p),
            ConfigError::Service(msg) => write!(f, "service file: {}", msg),
            ConfigError::InvalidSslMode(m) => {
                write!(f, "invalid sslmode '{}' (disable, prefer, require)", m)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Transport encryption policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            // allow/prefer behave the same for us: try TLS, fall back to plain
            "allow" | "prefer" => Ok(SslMode::Prefer),
            "require" | "verify-ca" | "verify-full" => Ok(SslMode::Require),
            other => Err(ConfigError::InvalidSslMode(other.to_string())),
        }
    }
}

/// Resolved connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Host name, IP address or unix socket directory. `None` means the
    /// default socket.
    pub host: Option<String>,
    pub port: u16,
    pub user: String,
    pub dbname: String,
    pub password: Option<String>,
    pub service_name: Option<String>,
    pub sslmode: SslMode,
    /// Managed instance: never correlate with local processes.
    pub rds_mode: bool,
}

impl ConnectionParams {
    /// Human-readable `user@host:port/dbname`.
    pub fn identity(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user,
            self.host.as_deref().unwrap_or("local"),
            self.port,
            self.dbname
        )
    }
}

/// Values given on the command line; `None` falls through to the next layer.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub dbname: Option<String>,
    pub service: Option<String>,
    pub sslmode: Option<String>,
    pub rds_mode: bool,
}

impl ConnectionOverrides {
    /// Resolves the final parameters.
    ///
    /// `env` looks up environment variables; `service_file` is the content
    /// of the libpq service file, read only when a service is named.
    pub fn resolve(
        self,
        env: &dyn Fn(&str) -> Option<String>,
        service_file: &dyn Fn(&Path) -> std::io::Result<String>,
    ) -> Result<ConnectionParams, ConfigError> {
        let service_name = self.service.clone().or_else(|| env("PGSERVICE"));
        let service = match &service_name {
            Some(name) => {
                let path = service_file_path(env).ok_or_else(|| {
                    ConfigError::Service("cannot locate pg_service.conf (set PGSERVICEFILE)".into())
                })?;
                let content = service_file(&path)
                    .map_err(|e| ConfigError::Service(format!("{}: {}", path.display(), e)))?;
                parse_service_file(&content, name).ok_or_else(|| {
                    ConfigError::Service(format!("service '{}' not found in {}", name, path.display()))
                })?
            }
            None => HashMap::new(),
        };

        let pick = |cli: Option<String>, key: &str, var: &str| -> Option<String> {
            cli.or_else(|| service.get(key).cloned())
                .or_else(|| env(var))
                .filter(|v| !v.is_empty())
        };

        let host = pick(self.host, "host", "PGHOST");
        let port = match pick(self.port, "port", "PGPORT") {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ConfigError::InvalidPort(p))?,
            None => DEFAULT_PORT,
        };
        let user = pick(self.user, "user", "PGUSER")
            .or_else(|| env("USER"))
            .ok_or(ConfigError::MissingUser)?;
        let dbname = pick(self.dbname, "dbname", "PGDATABASE").unwrap_or_else(|| user.clone());
        let password = service
            .get("password")
            .cloned()
            .or_else(|| env("PGPASSWORD"))
            .filter(|p| !p.is_empty());
        let sslmode = match pick(self.sslmode, "sslmode", "PGSSLMODE") {
            Some(m) => m.parse()?,
            None => SslMode::default(),
        };

        Ok(ConnectionParams {
            host,
            port,
            user,
            dbname,
            password,
            service_name,
            sslmode,
            rds_mode: self.rds_mode,
        })
    }
}

fn service_file_path(env: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(path) = env("PGSERVICEFILE") {
        return Some(PathBuf::from(path));
    }
    env("HOME").map(|home| Path::new(&home).join(".pg_service.conf"))
}

/// Extracts the `key=value` pairs of section `[name]` from a libpq
/// service file. Returns `None` if the section does not exist.
pub fn parse_service_file(content: &str, name: &str) -> Option<HashMap<String, String>> {
    let mut in_section = false;
    let mut found = false;
    let mut values = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = section.trim() == name;
            found |= in_section;
            continue;
        }
        if in_section && let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    found.then_some(values)
}

/// Which columns the table shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFlags {
    pub database: bool,
    pub app_name: bool,
    pub user: bool,
    pub client: bool,
    pub cpu: bool,
    pub mem: bool,
    pub read: bool,
    pub write: bool,
    pub time: bool,
    pub wait: bool,
}

impl Default for DisplayFlags {
    fn default() -> Self {
        Self {
            database: true,
            app_name: true,
            user: true,
            client: true,
            cpu: true,
            mem: true,
            read: true,
            write: true,
            time: true,
            wait: true,
        }
    }
}

/// Immutable configuration handed to the controller.
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectionParams,
    pub flags: DisplayFlags,
    /// Delay between cycles.
    pub refresh: Duration,
    /// Rows with a shorter duration (seconds) are not displayed.
    pub min_duration: f64,
    /// Skip `pg_database_size()` in the header.
    pub skip_sizes: bool,
    /// Append each completed snapshot to this file.
    pub output: Option<PathBuf>,
    /// Print full diagnostics on fatal errors.
    pub debug: bool,
    /// Ask for a password when the server rejects the configured one.
    pub prompt_password: bool,
    /// Root of the proc filesystem.
    pub proc_path: String,
}

/// Clamps a refresh delay to the supported range.
pub fn clamp_refresh(refresh: Duration) -> Duration {
    refresh.clamp(REFRESH_MIN, REFRESH_MAX)
}
