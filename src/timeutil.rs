//! Nanosecond timestamp helpers
//!
//! Telemetry timestamps are unsigned nanoseconds since the Unix epoch,
//! end to end. The audit sink is the only place they are rendered as
//! text, via [`isoformat_ns`].

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as nanoseconds since the Unix epoch.
pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Render a nanosecond timestamp as UTC ISO-8601 with nine fractional
/// digits, e.g. `2023-11-14T22:13:20.000000000Z`.
pub fn isoformat_ns(ts: u64) -> String {
    let secs = (ts / 1_000_000_000) as i64;
    let nanos = (ts % 1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string(),
        // Unrepresentable in chrono's calendar range; fall back to raw.
        None => format!("{secs}.{nanos:09}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isoformat_known_instant() {
        assert_eq!(
            isoformat_ns(1_700_000_000_000_000_000),
            "2023-11-14T22:13:20.000000000Z"
        );
    }

    #[test]
    fn test_isoformat_keeps_nanosecond_precision() {
        assert_eq!(
            isoformat_ns(1_700_000_000_123_456_789),
            "2023-11-14T22:13:20.123456789Z"
        );
    }

    #[test]
    fn test_isoformat_epoch() {
        assert_eq!(isoformat_ns(0), "1970-01-01T00:00:00.000000000Z");
    }

    #[test]
    fn test_timestamp_ns_is_monotonic_enough() {
        let a = timestamp_ns();
        let b = timestamp_ns();
        assert!(b >= a);
        // Sanity: later than 2020-01-01.
        assert!(a > 1_577_836_800_000_000_000);
    }
}
