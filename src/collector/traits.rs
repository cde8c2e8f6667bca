//! Filesystem access seam.
//!
//! The merger, the disk sampler and the local-access check read `/proc`
//! through `FileSystem`, so they run against `MockFs` in tests.

use std::io;
use std::path::Path;

/// Read-only view of the proc and sys filesystems.
pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns `true` for existing files and directories.
    fn exists(&self, path: &Path) -> bool;
}

/// `std::fs` backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
