// src/format.rs

//! Human-readable renderings of sizes, speeds and durations.

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
const BASE: f64 = 1024.0;

/// Formats a byte count with base-1024 units, e.g. `1536` -> `"1.5 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    format_bytes(bytes as f64)
}

/// Formats a throughput in bytes per second, e.g. `"512 KB/s"`.
pub fn format_upload_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Formats seconds as `<n>s`, `<n>m` or `<n>h`, rounded to the nearest integer.
pub fn format_time_remaining(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{}s", seconds.round())
    } else if seconds < 3600.0 {
        format!("{}m", (seconds / 60.0).round())
    } else {
        format!("{}h", (seconds / 3600.0).round())
    }
}

fn format_bytes(bytes: f64) -> String {
    if bytes.is_nan() || bytes <= 0.0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes;
    let mut index = 0;
    while value >= BASE && index < UNITS.len() - 1 {
        value /= BASE;
        index += 1;
    }
    format!("{} {}", trim_decimals(value), UNITS[index])
}

/// Two decimal places with trailing zeros dropped.
fn trim_decimals(value: f64) -> String {
    let fixed = format!("{value:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}
