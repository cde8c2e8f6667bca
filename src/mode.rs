//! Display modes and the acquisition call each one implies.

use serde::Serialize;

use crate::model::RawSnapshot;
use crate::session::Session;
use crate::source::{Connector, DataSource, SourceError};

/// Data view shown in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Running queries from `pg_stat_activity`.
    #[default]
    Activities,
    /// Backends waiting on an ungranted lock.
    Waiting,
    /// Backends holding a lock somebody else waits on.
    Blocking,
}

impl Mode {
    /// Returns all modes in tab order.
    pub fn all() -> &'static [Mode] {
        &[Mode::Activities, Mode::Waiting, Mode::Blocking]
    }

    /// Returns the tab title.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Activities => "RUNNING QUERIES",
            Mode::Waiting => "WAITING QUERIES",
            Mode::Blocking => "BLOCKING QUERIES",
        }
    }

    /// Returns the function key bound to this mode.
    pub fn key(&self) -> u8 {
        match self {
            Mode::Activities => 1,
            Mode::Waiting => 2,
            Mode::Blocking => 3,
        }
    }
}

/// Holds the active mode.
///
/// Layout is not cached here; callers recompute it when `set_mode` reports
/// a change.
#[derive(Debug, Default)]
pub struct ModeSelector {
    mode: Mode,
}

impl ModeSelector {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches to `mode`. Returns `true` if the active mode changed.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if self.mode == mode {
            return false;
        }
        tracing::debug!("mode switch: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        true
    }

    /// Runs the acquisition call of the active mode through the session.
    pub fn acquire<C: Connector>(
        &self,
        session: &mut Session<C>,
    ) -> Result<RawSnapshot, SourceError> {
        let mode = self.mode;
        let rows = session.call(|source| match mode {
            Mode::Activities => source.activities(),
            Mode::Waiting => source.waiting(),
            Mode::Blocking => source.blocking(),
        })?;
        Ok(RawSnapshot { mode, rows })
    }
}
