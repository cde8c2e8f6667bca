//! Connection state machine.
//!
//! ```text
//! Disconnected ──connect ok──────────────▶ Connected
//! Connected ────communication failure────▶ Disconnected
//! Disconnected ─auth failure─▶ Reauthenticating ─▶ Connected | Disconnected
//! ```
//!
//! Data acquisition goes through [`Session::call`], which refuses to touch
//! the source unless the state is `Connected` and drops the connection as
//! soon as a call reports a transport failure.

use std::io;

use tracing::{debug, info, warn};

use crate::config::ConnectionParams;
use crate::error::AppError;
use crate::source::{Connector, DataSource, SourceError};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Reauthenticating,
}

/// Outcome of a failed connect.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Not retryable: repeated authentication failure, or any failure
    /// under fail-fast.
    Fatal(AppError),
    /// Retryable connection failure.
    ConnectionFailed(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Fatal(e) => write!(f, "{}", e),
            SessionError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Interactive source of replacement passwords.
pub trait PasswordPrompt {
    fn prompt(&mut self, params: &ConnectionParams) -> io::Result<String>;
}

/// Connection parameters plus the live handle.
pub struct Session<C: Connector> {
    connector: C,
    params: ConnectionParams,
    password: Option<String>,
    prompt: Option<Box<dyn PasswordPrompt>>,
    state: SessionState,
    source: Option<C::Source>,
}

impl<C: Connector> Session<C> {
    /// Creates a disconnected session. The configured password, if any, is
    /// tried first.
    pub fn new(connector: C, params: ConnectionParams) -> Self {
        Self {
            connector,
            password: params.password.clone(),
            params,
            prompt: None,
            state: SessionState::Disconnected,
            source: None,
        }
    }

    /// Enables interactive password retry.
    pub fn with_prompt(mut self, prompt: Box<dyn PasswordPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Password that last connected successfully (or the configured one).
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Establishes the connection.
    ///
    /// An authentication failure triggers one interactive password prompt
    /// and one retry; a second one is fatal. Any other failure is fatal
    /// with `fail_fast`, retryable otherwise.
    pub fn connect(&mut self, fail_fast: bool) -> Result<(), SessionError> {
        let mut reprompted = false;

        loop {
            debug!("connecting to {}", self.params.identity());
            match self
                .connector
                .connect(&self.params, self.password.as_deref())
            {
                Ok(source) => {
                    self.source = Some(source);
                    self.state = SessionState::Connected;
                    info!("connected to {}", self.params.identity());
                    return Ok(());
                }
                Err(SourceError::Authentication(msg)) => {
                    self.source = None;
                    if reprompted {
                        self.state = SessionState::Disconnected;
                        return Err(SessionError::Fatal(AppError::Config(format!(
                            "authentication failed for {}: {}",
                            self.params.identity(),
                            msg
                        ))));
                    }
                    let Some(prompt) = self.prompt.as_mut() else {
                        self.state = SessionState::Disconnected;
                        return Err(SessionError::Fatal(AppError::Config(format!(
                            "authentication failed for {}: {}",
                            self.params.identity(),
                            msg
                        ))));
                    };

                    warn!("authentication failed ({}), asking for a password", msg);
                    self.state = SessionState::Reauthenticating;
                    match prompt.prompt(&self.params) {
                        Ok(password) => {
                            self.password = Some(password);
                            reprompted = true;
                        }
                        Err(e) => {
                            self.state = SessionState::Disconnected;
                            return Err(SessionError::Fatal(AppError::Config(format!(
                                "cannot read password: {}",
                                e
                            ))));
                        }
                    }
                }
                Err(e) => {
                    self.source = None;
                    self.state = SessionState::Disconnected;
                    if fail_fast {
                        return Err(SessionError::Fatal(AppError::Connection(format!(
                            "{}: {}",
                            self.params.identity(),
                            e
                        ))));
                    }
                    debug!("connect attempt failed: {}", e);
                    return Err(SessionError::ConnectionFailed(e.to_string()));
                }
            }
        }
    }

    /// Drops the connection.
    pub fn disconnect(&mut self) {
        if self.source.take().is_some() {
            debug!("disconnected from {}", self.params.identity());
        }
        self.state = SessionState::Disconnected;
    }

    /// Runs `f` against the connected source.
    ///
    /// Returns `NotConnected` without calling `f` unless the state is
    /// `Connected`. A transport failure moves the session to
    /// `Disconnected`.
    pub fn call<T>(
        &mut self,
        f: impl FnOnce(&mut C::Source) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        if self.state != SessionState::Connected {
            return Err(SourceError::NotConnected);
        }
        let source = self.source.as_mut().ok_or(SourceError::NotConnected)?;

        match f(source) {
            Err(e) if e.is_connection_loss() => {
                warn!("lost connection to {}: {}", self.params.identity(), e);
                self.disconnect();
                Err(e)
            }
            other => other,
        }
    }

    /// Decides whether OS-level statistics can be correlated with backends.
    ///
    /// `false` for RDS mode, remote servers, and local servers whose
    /// processes the current user cannot read.
    pub fn detect_local_access(&mut self) -> Result<bool, SourceError> {
        if self.params.rds_mode {
            return Ok(false);
        }
        let is_local = self.call(|source| Ok(source.is_local()))?;
        if !is_local {
            return Ok(false);
        }
        self.call(|source| source.has_local_access())
    }
}
