use chrono::{DateTime, SecondsFormat};

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Render epoch milliseconds as an ISO-8601 UTC string.
///
/// Out-of-range inputs fall back to the epoch rather than panicking.
pub fn iso8601(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
