//! In-memory `FileSystem` with helpers for fake backend processes.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Besides files and directories it can mark paths as unreadable, which
/// simulates `/proc/[pid]/io` of a process owned by another user.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    directories: HashSet<PathBuf>,
    denied: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content. Parent directories are created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Makes reads of `path` fail with `PermissionDenied`.
    pub fn deny(&mut self, path: impl AsRef<Path>) {
        self.denied.insert(path.as_ref().to_path_buf());
    }

    /// Removes a file, as if the process behind it exited.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    /// Adds a PostgreSQL backend with the `/proc/[pid]/` files the merger
    /// reads.
    ///
    /// `ticks` is utime + stime (split evenly), `rss_kb` is VmRSS, and
    /// `read`/`write` are the cumulative `read_bytes`/`write_bytes`.
    pub fn add_backend(&mut self, pid: i32, state: char, ticks: u64, rss_kb: u64, read: u64, write: u64) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        let utime = ticks / 2;
        let stime = ticks - utime;
        self.add_file(
            base.join("stat"),
            format!(
                "{pid} (postgres) {state} 1 {pid} {pid} 0 -1 4194560 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 5000 200000000 {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
                rss = rss_kb / 4,
            ),
        );
        self.add_file(
            base.join("status"),
            format!("Name:\tpostgres\nPid:\t{pid}\nPPid:\t1\nUid:\t26\t26\t26\t26\nVmRSS:\t{rss_kb} kB\n"),
        );
        self.add_file(
            base.join("io"),
            format!(
                "rchar: {read}\nwchar: {write}\nsyscr: 0\nsyscw: 0\nread_bytes: {read}\nwrite_bytes: {write}\ncancelled_write_bytes: 0\n"
            ),
        );
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        if self.denied.contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        match self.files.get(path) {
            Some(content) => Ok(content.clone()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_create_parent_dirs() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");

        assert!(fs.exists(Path::new("/proc/meminfo")));
        assert!(fs.exists(Path::new("/proc")));
        let content = fs.read_to_string(Path::new("/proc/meminfo")).unwrap();
        assert_eq!(content, "MemTotal: 16384 kB\n");
    }

    #[test]
    fn backend_has_stat_status_and_io() {
        let mut fs = MockFs::new();
        fs.add_backend(4321, 'S', 10, 2048, 4096, 1024);

        assert!(fs.exists(Path::new("/proc/4321/stat")));
        assert!(fs.exists(Path::new("/proc/4321/status")));
        let io = fs.read_to_string(Path::new("/proc/4321/io")).unwrap();
        assert!(io.contains("read_bytes: 4096"));
        assert!(fs.exists(Path::new("/proc/4321")));
    }

    #[test]
    fn denied_and_removed_paths() {
        let mut fs = MockFs::new();
        fs.add_backend(7, 'S', 0, 0, 0, 0);
        fs.deny("/proc/7/io");
        fs.remove("/proc/7/stat");

        let denied = fs.read_to_string(Path::new("/proc/7/io")).unwrap_err();
        assert_eq!(denied.kind(), io::ErrorKind::PermissionDenied);
        let gone = fs.read_to_string(Path::new("/proc/7/stat")).unwrap_err();
        assert_eq!(gone.kind(), io::ErrorKind::NotFound);
    }
}
