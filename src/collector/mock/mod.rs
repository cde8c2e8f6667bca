//! Mock filesystem for testing collectors without Linux `/proc`.

mod filesystem;

pub use filesystem::MockFs;

/// Host with 8 GiB of memory, one disk with one partition and two
/// PostgreSQL backends (pids 1001 and 1002).
pub fn postgres_host() -> MockFs {
    let mut fs = MockFs::new();
    fs.add_file(
        "/proc/meminfo",
        "MemTotal:        8388608 kB\nMemFree:         4194304 kB\nMemAvailable:    6291456 kB\n",
    );
    fs.add_file(
        "/proc/diskstats",
        "   8       0 sda 100 0 2000 0 50 0 1000 0 0 0 0\n   8       1 sda1 100 0 2000 0 50 0 1000 0 0 0 0\n",
    );
    fs.add_dir("/sys/block/sda");
    fs.add_backend(1001, 'S', 100, 65536, 8192, 4096);
    fs.add_backend(1002, 'D', 50, 32768, 0, 0);
    fs
}
