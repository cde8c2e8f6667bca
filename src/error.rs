//! Fatal error taxonomy.
//!
//! Recoverable conditions (connection loss, a first authentication failure)
//! never become an `AppError`; they are handled by the session and the
//! reconnect loop. Everything here ends the process with exit code 1 after
//! the terminal has been released.

use crate::config::ConfigError;

/// Fatal error surfaced by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Bad configuration, including repeated authentication failure.
    Config(String),
    /// Initial connection failed and fail-fast was requested.
    Connection(String),
    /// OS refused access to a backend's process information.
    PermissionDenied { pid: i32, detail: String },
    /// Terminal could not be set up, drawn or restored.
    Display(String),
    /// Anything else, including panics.
    Unclassified(String),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// One-line message printed without `--debug`.
    pub fn short_message(&self) -> String {
        match self {
            AppError::Config(msg) => format!("configuration error: {}", msg),
            AppError::Connection(msg) => format!("could not connect: {}", msg),
            AppError::PermissionDenied { pid, .. } => format!(
                "permission denied reading process information of pid {} (run as the server's OS user, or use --rds)",
                pid
            ),
            AppError::Display(_) => "terminal error (use --debug for details)".to_string(),
            AppError::Unclassified(_) => "unexpected error (use --debug for details)".to_string(),
        }
    }

    /// Full diagnostic printed with `--debug`.
    pub fn detail(&self) -> String {
        match self {
            AppError::Config(msg) => format!("configuration error: {}", msg),
            AppError::Connection(msg) => format!("could not connect: {}", msg),
            AppError::PermissionDenied { pid, detail } => {
                format!("permission denied for pid {}: {}", pid, detail)
            }
            AppError::Display(msg) => format!("terminal error: {}", msg),
            AppError::Unclassified(msg) => format!("unexpected error: {}", msg),
        }
    }

    /// Message to print, honoring the debug flag.
    pub fn report(&self, debug: bool) -> String {
        if debug {
            self.detail()
        } else {
            self.short_message()
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail())
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}
