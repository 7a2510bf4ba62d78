//! Sizes and rates the way a drive check reports them
//!
//! Everything is binary (IEC) because catalog sizes, piece sizes and drive
//! capacities are all powers of two apart.

use std::time::Duration;

const IEC_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
const GIB: f64 = (1u64 << 30) as f64;
const MIB: f64 = (1u64 << 20) as f64;

/// `0 B`, `1023 B`, `1.50 KiB`, ..., capped at TiB
pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < IEC_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{size:.2} {}", IEC_UNITS[unit]),
    }
}

/// Rate of `bytes` hashed over `elapsed`, in MiB/s or GiB/s
pub fn format_throughput(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return "n/a".to_string();
    }
    let per_sec = bytes as f64 / secs;
    if per_sec >= GIB {
        format!("{:.2} GiB/s", per_sec / GIB)
    } else {
        format!("{:.1} MiB/s", per_sec / MIB)
    }
}

/// Wall time of a run, to the second: `42s`, `3m 05s`, `2h 07m`
pub fn format_duration(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    match seconds {
        0..60 => format!("{seconds}s"),
        60..3600 => format!("{}m {:02}s", seconds / 60, seconds % 60),
        _ => format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60),
    }
}

/// `1 car file`, `2 car files`
pub fn format_file_count(count: usize) -> String {
    match count {
        1 => "1 car file".to_string(),
        n => format!("{n} car files"),
    }
}
