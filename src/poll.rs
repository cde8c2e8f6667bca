//! One acquisition/merge/render cycle.
//!
//! A cycle either hands exactly one [`RenderBuffer`] to the renderer or
//! aborts before rendering. State that only makes sense for a completed
//! cycle (previous process samples, the post-first interval) is committed
//! after the render succeeded.

use std::time::Duration;

use tracing::{debug, warn};

use crate::collector::merger::{MergeError, ProcessMerger};
use crate::collector::procfs::IoSampler;
use crate::config::DisplayFlags;
use crate::delta::DeltaTracker;
use crate::error::AppError;
use crate::layout::Indent;
use crate::mode::{Mode, ModeSelector};
use crate::model::{Extras, ProcSamples, RenderBuffer};
use crate::session::Session;
use crate::source::{Connector, DataSource, SourceError};
use crate::tui::Renderer;

/// Why a cycle aborted.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleError {
    /// Transport failure; the controller reconnects.
    ConnectionLost(String),
    PermissionDenied { pid: i32, detail: String },
    Display(String),
    Unclassified(String),
    /// Shutdown was requested while the cycle ran; nothing was rendered.
    Interrupted,
}

impl CycleError {
    /// Converts a fatal cycle error into the application taxonomy.
    /// `None` for connection loss and interruption.
    pub fn into_fatal(self) -> Option<AppError> {
        match self {
            CycleError::ConnectionLost(_) | CycleError::Interrupted => None,
            CycleError::PermissionDenied { pid, detail } => {
                Some(AppError::PermissionDenied { pid, detail })
            }
            CycleError::Display(msg) => Some(AppError::Display(msg)),
            CycleError::Unclassified(msg) => Some(AppError::Unclassified(msg)),
        }
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleError::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            CycleError::PermissionDenied { pid, detail } => {
                write!(f, "permission denied for pid {}: {}", pid, detail)
            }
            CycleError::Display(msg) => write!(f, "display error: {}", msg),
            CycleError::Unclassified(msg) => write!(f, "{}", msg),
            CycleError::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for CycleError {}

impl From<SourceError> for CycleError {
    fn from(e: SourceError) -> Self {
        if e.is_connection_loss() {
            CycleError::ConnectionLost(e.to_string())
        } else {
            CycleError::Unclassified(e.to_string())
        }
    }
}

impl From<MergeError> for CycleError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::PermissionDenied { pid, detail } => {
                CycleError::PermissionDenied { pid, detail }
            }
            MergeError::Io(msg) => CycleError::Unclassified(msg),
        }
    }
}

/// Per-run cycle options.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub flags: DisplayFlags,
    pub skip_sizes: bool,
    /// Interval used for rates once the first cycle completed.
    pub refresh: Duration,
}

/// Cycle state carried from one execution to the next.
pub struct PollCycle<M: ProcessMerger, S: IoSampler> {
    selector: ModeSelector,
    deltas: DeltaTracker,
    merger: M,
    sampler: S,
    local_access: bool,
    extras: Extras,
    options: CycleOptions,
    /// Seconds the rates are computed over; 0 until the first cycle ends.
    interval: f64,
    indent: Option<Indent>,
    max_name_length: usize,
    previous_samples: ProcSamples,
}

impl<M: ProcessMerger, S: IoSampler> PollCycle<M, S> {
    /// `local_access` is decided once after the initial connect; without
    /// it the sampler is never called.
    pub fn new(
        merger: M,
        sampler: S,
        local_access: bool,
        extras: Extras,
        options: CycleOptions,
    ) -> Self {
        Self {
            selector: ModeSelector::default(),
            deltas: DeltaTracker::new(),
            merger,
            sampler,
            local_access,
            extras,
            options,
            interval: 0.0,
            indent: None,
            max_name_length: 0,
            previous_samples: ProcSamples::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.selector.mode()
    }

    /// Switches mode; a change drops the cached layout.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.selector.set_mode(mode) {
            self.indent = None;
        }
    }

    /// Changes the interval used for rates from the next cycle on.
    pub fn set_refresh(&mut self, refresh: Duration) {
        self.options.refresh = refresh;
        if self.interval > 0.0 {
            self.interval = refresh.as_secs_f64();
        }
    }

    pub fn local_access(&self) -> bool {
        self.local_access
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Cached layout; `None` means the next cycle recomputes it.
    pub fn indent(&self) -> Option<&Indent> {
        self.indent.as_ref()
    }

    /// Forgets all previous samples. The next cycle reports no rates, and
    /// the one after it divides by the refresh delay again.
    ///
    /// Called whenever a cycle starts before the refresh delay elapsed.
    pub fn restart_rates(&mut self) {
        self.deltas.reset();
        self.previous_samples.clear();
        self.interval = 0.0;
    }

    /// Forgets samples taken over the old connection. The first cycle after
    /// a reconnect reports no rates.
    pub fn reconnected(&mut self) {
        self.restart_rates();
        self.indent = None;
    }

    /// Runs one cycle.
    pub fn execute<C: Connector, R: Renderer>(
        &mut self,
        session: &mut Session<C>,
        renderer: &mut R,
    ) -> Result<RenderBuffer, CycleError> {
        self.execute_unless(session, renderer, || false)
    }

    /// Runs one cycle, aborting with [`CycleError::Interrupted`] instead of
    /// rendering once `interrupted` returns `true`.
    pub fn execute_unless<C: Connector, R: Renderer>(
        &mut self,
        session: &mut Session<C>,
        renderer: &mut R,
        interrupted: impl Fn() -> bool,
    ) -> Result<RenderBuffer, CycleError> {
        if renderer
            .check_resized()
            .map_err(|e| CycleError::Display(e.to_string()))?
        {
            debug!("terminal resized, recomputing layout");
            self.indent = None;
        }

        let snapshot = self.selector.acquire(session)?;

        let io = if self.local_access {
            let sample = self
                .sampler
                .sample()
                .map_err(|e| CycleError::Unclassified(format!("disk statistics: {}", e)))?;
            self.deltas.io_delta(sample, self.interval)
        } else {
            None
        };

        let (procs, samples) = self.merger.merge(
            &snapshot,
            &self.previous_samples,
            self.local_access,
            self.interval,
        )?;

        let skip_sizes = self.options.skip_sizes;
        let stats = session.call(|source| source.db_stats(skip_sizes))?;
        let db_info = self.deltas.db_info(stats, self.interval);

        let active_connections = session.call(|source| source.active_connections())?;

        if db_info.max_name_length != self.max_name_length {
            self.max_name_length = db_info.max_name_length;
            self.indent = None;
        }
        let indent = match self.indent.take() {
            Some(indent) => indent,
            None => Indent::compute(
                snapshot.mode,
                &self.options.flags,
                self.local_access,
                self.max_name_length,
            ),
        };

        let buffer = RenderBuffer {
            procs,
            extras: self.extras.clone(),
            mode: snapshot.mode,
            indent: indent.clone(),
            flags: self.options.flags,
            io,
            db_info,
            active_connections,
            interval: self.interval,
        };

        if interrupted() {
            debug!("shutdown requested, cycle dropped before render");
            return Err(CycleError::Interrupted);
        }
        if let Err(e) = renderer.render(&buffer) {
            warn!("render failed: {}", e);
            return Err(CycleError::Display(e.to_string()));
        }

        self.indent = Some(indent);
        self.previous_samples = samples;
        self.interval = self.options.refresh.as_secs_f64();
        Ok(buffer)
    }
}

/// Builds the header identities. In degraded mode the remote host gets its
/// own line.
pub fn extras_for<C: Connector>(
    session: &mut Session<C>,
    local_access: bool,
) -> Result<Extras, SourceError> {
    let server_identity = session.call(|source| source.server_identity())?;
    let params = session.params();
    let remote_host = if local_access {
        None
    } else {
        Some(
            params
                .host
                .clone()
                .unwrap_or_else(|| "local socket".to_string()),
        )
    };
    Ok(Extras {
        server_identity,
        connection_identity: params.identity(),
        remote_host,
    })
}
