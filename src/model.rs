//! Data passed between the poll loop and its collaborators.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::DisplayFlags;
use crate::layout::Indent;
use crate::mode::Mode;

/// Lock held or awaited by a backend (waiting/blocking modes).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LockInfo {
    pub mode: String,
    pub lock_type: String,
    pub relation: String,
}

/// One backend as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendRow {
    pub pid: i32,
    pub application_name: String,
    pub database: String,
    pub user: String,
    pub client: String,
    /// Seconds since `query_start`.
    pub duration: f64,
    pub state: String,
    pub wait: bool,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockInfo>,
}

/// Unmerged rows of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub mode: Mode,
    pub rows: Vec<BackendRow>,
}

/// Cumulative OS counters of one backend process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcSample {
    /// utime + stime, in jiffies.
    pub cpu_ticks: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Raw samples keyed by pid, kept between cycles.
pub type ProcSamples = HashMap<i32, ProcSample>;

/// OS statistics derived for one backend over one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcStats {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub read_per_sec: f64,
    pub write_per_sec: f64,
    /// Process is in uninterruptible sleep (state `D`).
    pub io_wait: bool,
}

/// Row handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRow {
    #[serde(flatten)]
    pub backend: BackendRow,
    /// `None` in degraded mode or when the process vanished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<ProcStats>,
}

/// System-wide cumulative disk counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskIoSample {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Disk throughput over one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskIoDelta {
    pub read_per_sec: f64,
    pub write_per_sec: f64,
}

/// Cumulative database counters as returned by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DbStats {
    /// Sum of committed and rolled back transactions.
    pub xact_total: i64,
    /// Sum of database sizes in bytes; `None` when sizes are skipped.
    pub total_size: Option<i64>,
    pub max_name_length: usize,
}

/// Database-wide figures shown in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DbInfoSnapshot {
    #[serde(skip)]
    pub xact_total: i64,
    pub tps: f64,
    pub total_size: i64,
    /// Size growth in bytes per second.
    pub size_evolution: f64,
    pub max_name_length: usize,
}

/// Identity lines of the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extras {
    pub server_identity: String,
    pub connection_identity: String,
    /// Set in degraded mode; occupies an extra header line.
    pub remote_host: Option<String>,
}

/// Everything one render needs. Built fresh each cycle and never mutated
/// after it reaches the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBuffer {
    pub procs: Vec<ProcessRow>,
    pub extras: Extras,
    pub mode: Mode,
    pub indent: Indent,
    pub flags: DisplayFlags,
    pub io: Option<DiskIoDelta>,
    pub db_info: DbInfoSnapshot,
    pub active_connections: i64,
    /// Interval the rates were computed over, in seconds.
    pub interval: f64,
}
