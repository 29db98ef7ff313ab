//! Utility functions for Batata
//!
//! Common helper functions used across the codebase.

use std::time::Duration;

/// Parse a duration string such as `200ms`, `10s`, `5m` or `72h`.
///
/// A bare number is read as seconds. Values that overflow are `None`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use batata_common::parse_duration;
///
/// assert_eq!(parse_duration("200ms"), Some(Duration::from_millis(200)));
/// assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
/// assert_eq!(parse_duration("abc"), None);
/// ```
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().ok().map(Duration::from_secs)
    } else if let Some(m) = s.strip_suffix('m') {
        m.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(h) = s.strip_suffix('h') {
        h.parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse().ok().map(Duration::from_secs)
    }
}

/// Format a duration the way autopilot reports last contact (`12ms`)
pub fn format_millis(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}

/// Current time as unix millis
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("72h"), Some(Duration::from_secs(259_200)));
        assert_eq!(parse_duration(" 15 "), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("6000000000000000h"), None);
        assert_eq!(parse_duration("400000000000000000m"), None);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(Duration::from_millis(12)), "12ms");
        assert_eq!(format_millis(Duration::ZERO), "0ms");
    }
}
