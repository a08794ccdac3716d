//! Timestamp utilities

use chrono::DateTime;

/// Convert seconds to duration
pub fn secs_to_duration(secs: u64) -> std::time::Duration {
    std::time::Duration::from_secs(secs)
}

/// Parse an RFC 3339 timestamp into epoch seconds
///
/// Returns `None` when the string is empty or not RFC 3339.
pub fn parse_epoch(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.timestamp())
}
