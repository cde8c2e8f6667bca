//! Correlates backend rows with their OS processes.

use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::collector::procfs::{
    parse_mem_total_kb, parse_proc_io, parse_proc_stat, parse_status_rss_kb,
};
use crate::collector::traits::FileSystem;
use crate::model::{ProcSample, ProcSamples, ProcStats, ProcessRow, RawSnapshot};

/// Kernel clock ticks per second (`sysconf(_SC_CLK_TCK)`), 100 on Linux.
const CLK_TCK: f64 = 100.0;

/// Error type for merge failures.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeError {
    /// A backend's `/proc` files are not readable by the current user.
    PermissionDenied { pid: i32, detail: String },
    /// A system-wide file could not be read.
    Io(String),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::PermissionDenied { pid, detail } => {
                write!(f, "permission denied reading process {}: {}", pid, detail)
            }
            MergeError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for MergeError {}

/// Output of one merge: rows to display and the raw samples to diff
/// against next time.
pub type MergeOutput = (Vec<ProcessRow>, ProcSamples);

/// Turns a raw snapshot into display rows.
pub trait ProcessMerger {
    /// Merges `snapshot` with OS statistics computed against `previous`.
    ///
    /// Without `local_access` no OS file is touched and rows carry no
    /// statistics.
    fn merge(
        &mut self,
        snapshot: &RawSnapshot,
        previous: &ProcSamples,
        local_access: bool,
        interval: f64,
    ) -> Result<MergeOutput, MergeError>;
}

/// `ProcessMerger` reading `/proc` through a `FileSystem`.
pub struct ProcMerger<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    min_duration: f64,
}

impl<F: FileSystem> ProcMerger<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            min_duration: 0.0,
        }
    }

    /// Hides rows running for less than `seconds`.
    pub fn with_min_duration(mut self, seconds: f64) -> Self {
        self.min_duration = seconds;
        self
    }

    /// Reads one `/proc/<pid>/<name>` file.
    ///
    /// `Ok(None)` means the process is gone; only `EACCES` is an error.
    fn read_pid_file(&self, pid: i32, name: &str) -> Result<Option<String>, MergeError> {
        let path = self.proc_path.join(pid.to_string()).join(name);
        match self.fs.read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(MergeError::PermissionDenied {
                    pid,
                    detail: format!("{}: {}", path.display(), e),
                })
            }
            Err(e) => {
                debug!("pid {} vanished ({}): {}", pid, path.display(), e);
                Ok(None)
            }
        }
    }

    fn read_sample(&self, pid: i32) -> Result<Option<(ProcSample, u64, bool)>, MergeError> {
        let Some(stat) = self.read_pid_file(pid, "stat")? else {
            return Ok(None);
        };
        let Some(status) = self.read_pid_file(pid, "status")? else {
            return Ok(None);
        };
        let Some(io) = self.read_pid_file(pid, "io")? else {
            return Ok(None);
        };

        let stat = match parse_proc_stat(&stat) {
            Ok(stat) => stat,
            Err(e) => {
                debug!("pid {}: {}", pid, e);
                return Ok(None);
            }
        };
        let io = parse_proc_io(&io);

        let sample = ProcSample {
            cpu_ticks: stat.utime + stat.stime,
            read_bytes: io.read_bytes,
            write_bytes: io.write_bytes,
        };
        Ok(Some((sample, parse_status_rss_kb(&status), stat.state == 'D')))
    }

    fn mem_total_kb(&self) -> Result<u64, MergeError> {
        let path = self.proc_path.join("meminfo");
        let content = self
            .fs
            .read_to_string(&path)
            .map_err(|e| MergeError::Io(format!("{}: {}", path.display(), e)))?;
        parse_mem_total_kb(&content).map_err(|e| MergeError::Io(e.to_string()))
    }
}

fn rate(current: u64, previous: u64, interval: f64) -> f64 {
    current.saturating_sub(previous) as f64 / interval
}

fn stats(
    sample: &ProcSample,
    previous: Option<&ProcSample>,
    rss_kb: u64,
    mem_total_kb: u64,
    io_wait: bool,
    interval: f64,
) -> ProcStats {
    let mem_percent = if mem_total_kb > 0 {
        rss_kb as f64 * 100.0 / mem_total_kb as f64
    } else {
        0.0
    };

    let mut stats = ProcStats {
        mem_percent,
        io_wait,
        ..ProcStats::default()
    };
    if let Some(prev) = previous
        && interval > 0.0
    {
        stats.cpu_percent = rate(sample.cpu_ticks, prev.cpu_ticks, interval) / CLK_TCK * 100.0;
        stats.read_per_sec = rate(sample.read_bytes, prev.read_bytes, interval);
        stats.write_per_sec = rate(sample.write_bytes, prev.write_bytes, interval);
    }
    stats
}

impl<F: FileSystem> ProcessMerger for ProcMerger<F> {
    fn merge(
        &mut self,
        snapshot: &RawSnapshot,
        previous: &ProcSamples,
        local_access: bool,
        interval: f64,
    ) -> Result<MergeOutput, MergeError> {
        let mut samples = ProcSamples::new();
        let mut rows = Vec::with_capacity(snapshot.rows.len());
        let mem_total_kb = if local_access { self.mem_total_kb()? } else { 0 };

        for backend in &snapshot.rows {
            let os = if local_access {
                match self.read_sample(backend.pid)? {
                    Some((sample, rss_kb, io_wait)) => {
                        let os = stats(
                            &sample,
                            previous.get(&backend.pid),
                            rss_kb,
                            mem_total_kb,
                            io_wait,
                            interval,
                        );
                        samples.insert(backend.pid, sample);
                        Some(os)
                    }
                    None => None,
                }
            } else {
                None
            };

            if backend.duration < self.min_duration {
                continue;
            }
            rows.push(ProcessRow {
                backend: backend.clone(),
                os,
            });
        }

        rows.sort_by(|a, b| b.backend.duration.total_cmp(&a.backend.duration));
        Ok((rows, samples))
    }
}
