/// Presence inference from "last seen" heartbeats
use chrono::{DateTime, Duration, Utc};

/// Freshness window: a user with no heartbeat for this long is offline.
pub const FRESHNESS_WINDOW_MS: i64 = 2 * 60 * 1000;

/// Evaluate presence at the instant `now`.
///
/// `false` when `last_seen` is absent, otherwise `true` iff the heartbeat is
/// strictly younger than the freshness window. Pure and total.
pub fn is_online(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_seen {
        Some(seen) => now - seen < Duration::milliseconds(FRESHNESS_WINDOW_MS),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_heartbeat_is_offline() {
        assert!(!is_online(None, Utc::now()));
    }

    #[test]
    fn test_window_boundary() {
        let now = Utc::now();
        let at = |ms: i64| Some(now - Duration::milliseconds(ms));

        assert!(is_online(at(0), now));
        assert!(is_online(at(119_999), now));
        assert!(!is_online(at(120_000), now));
        assert!(!is_online(at(120_001), now));
    }

    #[test]
    fn test_future_heartbeat_is_online() {
        // Clock skew: a heartbeat slightly ahead of `now` still counts
        let now = Utc::now();
        assert!(is_online(Some(now + Duration::seconds(5)), now));
    }
}
