//! Parsers for `/proc` files.
//!
//! Pure functions over file content; only the fields the merger and the
//! disk sampler need are extracted.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parsed data from `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so it is delimited
/// by the first `(` and the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;
    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;
    let comm = content[open_paren + 1..close_paren].to_string();

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < 13 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 13+, got {}",
            fields.len()
        )));
    }

    let parse_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: parse_u64(1, "ppid")? as u32,
        utime: parse_u64(11, "utime")?,
        stime: parse_u64(12, "stime")?,
    })
}

/// Extracts `VmRSS` (kB) from `/proc/[pid]/status`. Kernel threads and
/// zombies have no `VmRSS` line and yield 0.
pub fn parse_status_rss_kb(content: &str) -> u64 {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Parsed data from `/proc/[pid]/io`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Parses `/proc/[pid]/io` content.
pub fn parse_proc_io(content: &str) -> ProcIo {
    let mut io = ProcIo::default();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value: u64 = value.trim().parse().unwrap_or(0);
            match key.trim() {
                "read_bytes" => io.read_bytes = value,
                "write_bytes" => io.write_bytes = value,
                _ => {}
            }
        }
    }
    io
}

/// Extracts `MemTotal` (kB) from `/proc/meminfo`.
pub fn parse_mem_total_kb(content: &str) -> Result<u64, ParseError> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ParseError::new("MemTotal not found in meminfo"))
}

/// One line of `/proc/diskstats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskStats {
    pub device: String,
    pub read_sectors: u64,
    pub write_sectors: u64,
}

/// Parses `/proc/diskstats` content.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged
/// w_sectors w_time io_pending io_time w_io_time [discards ...]
pub fn parse_diskstats(content: &str) -> Vec<DiskStats> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 14 {
                return None;
            }
            let get = |idx: usize| -> u64 { parts[idx].parse().unwrap_or(0) };
            Some(DiskStats {
                device: parts[2].to_string(),
                read_sectors: get(5),
                write_sectors: get(9),
            })
        })
        .collect()
}
