//! Interval-over-interval rates.
//!
//! Every rate needs two samples taken one interval apart. The first sample
//! after startup (or after [`DeltaTracker::reset`]) only primes the tracker.

use crate::model::{DbInfoSnapshot, DbStats, DiskIoDelta, DiskIoSample};

fn per_second(current: u64, previous: u64, interval: f64) -> f64 {
    // Counters can go backwards after a device hot-unplug or a stats reset.
    current.saturating_sub(previous) as f64 / interval
}

/// Keeps the previous samples needed for deltas.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    prev_io: Option<DiskIoSample>,
    prev_db: Option<DbInfoSnapshot>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sample` and returns throughput against the previous one.
    ///
    /// Returns `None` on the first sample or when `interval` is not
    /// positive.
    pub fn io_delta(&mut self, sample: DiskIoSample, interval: f64) -> Option<DiskIoDelta> {
        let prev = self.prev_io.replace(sample)?;
        if interval <= 0.0 {
            return None;
        }
        Some(DiskIoDelta {
            read_per_sec: per_second(sample.read_bytes, prev.read_bytes, interval),
            write_per_sec: per_second(sample.write_bytes, prev.write_bytes, interval),
        })
    }

    /// Builds the header snapshot from fresh counters.
    ///
    /// Without sizes (`stats.total_size == None`) the previous total size is
    /// carried over and the size evolution is zero; TPS and name length are
    /// still refreshed.
    pub fn db_info(&mut self, stats: DbStats, interval: f64) -> DbInfoSnapshot {
        let prev = self.prev_db;
        let total_size = stats
            .total_size
            .or(prev.map(|p| p.total_size))
            .unwrap_or(0);

        let (tps, size_evolution) = match prev {
            Some(p) if interval > 0.0 => {
                let tps = (stats.xact_total - p.xact_total).max(0) as f64 / interval;
                let evolution = match stats.total_size {
                    Some(size) => (size - p.total_size) as f64 / interval,
                    None => 0.0,
                };
                (tps, evolution)
            }
            _ => (0.0, 0.0),
        };

        let snapshot = DbInfoSnapshot {
            xact_total: stats.xact_total,
            tps,
            total_size,
            size_evolution,
            max_name_length: stats.max_name_length,
        };
        self.prev_db = Some(snapshot);
        snapshot
    }

    /// Forgets all previous samples.
    pub fn reset(&mut self) {
        self.prev_io = None;
        self.prev_db = None;
    }
}
