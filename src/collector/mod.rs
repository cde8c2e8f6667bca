//! Data collectors: the PostgreSQL source, `/proc` parsing and the process
//! merger.

pub mod merger;
#[cfg(test)]
pub mod mock;
pub mod pg;
pub mod procfs;
pub mod traits;

pub use merger::{MergeError, MergeOutput, ProcMerger, ProcessMerger};
pub use pg::{PgConnector, PgSource};
pub use procfs::{DiskStatsSampler, IoSampler};
pub use traits::{FileSystem, RealFs};
