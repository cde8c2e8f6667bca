//! `/proc` parsing and system-wide disk counters.

mod parser;

use std::io;
use std::path::PathBuf;

pub use parser::{
    DiskStats, ParseError, ProcIo, ProcStat, parse_diskstats, parse_mem_total_kb, parse_proc_io,
    parse_proc_stat, parse_status_rss_kb,
};

use crate::collector::traits::FileSystem;
use crate::model::DiskIoSample;

/// Kernel sector size used by `/proc/diskstats`, independent of the device.
const SECTOR_SIZE: u64 = 512;

/// Source of cumulative disk counters, sampled once per cycle.
pub trait IoSampler {
    fn sample(&mut self) -> io::Result<DiskIoSample>;
}

/// Sums whole-device counters from `/proc/diskstats`.
///
/// A device counts when `<sys_block>/<name>` exists; partitions live below
/// their parent device there and are skipped, so no I/O is counted twice.
pub struct DiskStatsSampler<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    sys_block_path: PathBuf,
}

impl<F: FileSystem> DiskStatsSampler<F> {
    pub fn new(fs: F) -> Self {
        Self::with_paths(fs, "/proc", "/sys/block")
    }

    pub fn with_paths(
        fs: F,
        proc_path: impl Into<PathBuf>,
        sys_block_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            sys_block_path: sys_block_path.into(),
        }
    }
}

impl<F: FileSystem> IoSampler for DiskStatsSampler<F> {
    fn sample(&mut self) -> io::Result<DiskIoSample> {
        let content = self
            .fs
            .read_to_string(&self.proc_path.join("diskstats"))?;

        let mut sample = DiskIoSample::default();
        for disk in parse_diskstats(&content) {
            if !self.fs.exists(&self.sys_block_path.join(&disk.device)) {
                continue;
            }
            sample.read_bytes += disk.read_sectors * SECTOR_SIZE;
            sample.write_bytes += disk.write_sectors * SECTOR_SIZE;
        }
        Ok(sample)
    }
}
