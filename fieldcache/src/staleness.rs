use chrono::{DateTime, Duration, Utc};

/// Cadence at which the satellite source re-images a given location.
pub const REVISIT_INTERVAL_DAYS: i64 = 5;

pub fn revisit_interval() -> Duration {
    Duration::days(REVISIT_INTERVAL_DAYS)
}

/// An entry is stale once its age reaches the revisit interval (inclusive):
/// a fresher scene may exist, so it is worth re-fetching.
pub fn is_stale(cached_at: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    now.signed_duration_since(cached_at) >= interval
}

/// Coarse human label for an entry's age. Buckets are inclusive-lower,
/// exclusive-upper.
pub fn age_label(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(cached_at);
    if age < Duration::minutes(1) {
        "just now".to_string()
    } else if age < Duration::hours(1) {
        format!("{}m ago", age.num_minutes())
    } else if age < Duration::hours(24) {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_exactly_five_days_is_stale() {
        let cached = Utc.with_ymd_and_hms(2026, 7, 5, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 12, 0, 0).unwrap();
        assert!(is_stale(cached, now, revisit_interval()));
    }

    #[test]
    fn test_four_days_twenty_three_hours_is_fresh() {
        let cached = Utc.with_ymd_and_hms(2026, 7, 5, 13, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 12, 0, 0).unwrap();
        assert!(!is_stale(cached, now, revisit_interval()));
    }

    #[test]
    fn test_age_label_buckets() {
        assert_eq!(age_label(at(12, 0, 30), at(12, 1, 0)), "just now");
        assert_eq!(age_label(at(12, 0, 0), at(12, 1, 0)), "1m ago");
        assert_eq!(age_label(at(12, 0, 0), at(12, 59, 59)), "59m ago");
        assert_eq!(age_label(at(11, 0, 0), at(12, 0, 0)), "1h ago");
        assert_eq!(age_label(at(0, 0, 0), at(23, 59, 59)), "23h ago");
        let cached = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(age_label(cached, at(0, 0, 0)), "9d ago");
    }
}
