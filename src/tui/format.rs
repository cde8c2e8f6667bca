//! Cell formatting.

/// Format bytes to human-readable size.
pub fn format_bytes(bytes: i64) -> String {
    let sign = if bytes < 0 { "-" } else { "" };
    let abs = bytes.unsigned_abs();
    if abs >= 1024 * 1024 * 1024 {
        format!("{}{:.1} GiB", sign, abs as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if abs >= 1024 * 1024 {
        format!("{}{:.1} MiB", sign, abs as f64 / (1024.0 * 1024.0))
    } else if abs >= 1024 {
        format!("{}{:.1} KiB", sign, abs as f64 / 1024.0)
    } else {
        format!("{}{} B", sign, abs)
    }
}

/// Format bytes per second rate to human-readable.
pub fn format_bytes_rate(rate: f64) -> String {
    if rate < 1.0 {
        "0".to_string()
    } else if rate >= 1024.0 * 1024.0 * 1024.0 {
        format!("{:.1}G/s", rate / (1024.0 * 1024.0 * 1024.0))
    } else if rate >= 1024.0 * 1024.0 {
        format!("{:.1}M/s", rate / (1024.0 * 1024.0))
    } else if rate >= 1024.0 {
        format!("{:.1}K/s", rate / 1024.0)
    } else {
        format!("{:.0}B/s", rate)
    }
}

/// Format query duration as `S.cc` under a minute, `MmSS` under an hour,
/// `HhMM` beyond.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return "-".to_string();
    }
    if seconds < 60.0 {
        return format!("{:.2}", seconds);
    }
    let secs = seconds as u64;
    if secs < 3600 {
        format!("{}m{:02}", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}", secs / 3600, (secs % 3600) / 60)
    }
}

/// Truncates to `max_len` characters, marking the cut with `~`.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_len.saturating_sub(1)).collect();
    out.push('~');
    out
}

/// Normalize query text for single-line display.
pub fn normalize_query(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
