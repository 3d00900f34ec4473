//! CLI utility functions.

/// Human-readable input size for progress messages.
pub fn format_bytes(bytes: usize) -> String {
    const UNIT: usize = 1024;

    match bytes {
        0..UNIT => format!("{bytes} B"),
        // Values that would round up to "1024.0 KB" are shown in MB.
        _ if bytes.saturating_mul(10) < UNIT * UNIT * 10 - UNIT / 2 => {
            format!("{:.1} KB", bytes as f64 / UNIT as f64)
        }
        _ => format!("{:.2} MB", bytes as f64 / (UNIT * UNIT) as f64),
    }
}
