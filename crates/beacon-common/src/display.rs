//! Human readable formatting used when rendering notifications.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// A duration partitioned into its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

/// Partition the given duration into hours, minutes and seconds.
pub fn partition(duration: Duration) -> Partition {
    let total = duration.as_secs();

    Partition {
        hours: total / 3600,
        minutes: (total % 3600) / 60,
        seconds: total % 60,
    }
}

/// Format the given duration as a compact human time, like `1h2m3s`.
pub fn compact_duration(duration: Duration) -> String {
    let p = partition(duration);
    let mut out = String::new();

    if p.hours > 0 {
        out.push_str(&format!("{}h", p.hours));
    }

    if p.minutes > 0 {
        out.push_str(&format!("{}m", p.minutes));
    }

    if p.seconds > 0 || out.is_empty() {
        out.push_str(&format!("{}s", p.seconds));
    }

    out
}

/// Format a viewer or view count with a magnitude suffix, like `1.2K`.
pub fn viewers(count: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];

    for (factor, suffix) in UNITS {
        if count >= factor {
            let whole = count / factor;
            let tenth = (count % factor) * 10 / factor;

            if tenth == 0 || whole >= 100 {
                return format!("{}{}", whole, suffix);
            }

            return format!("{}.{}{}", whole, tenth, suffix);
        }
    }

    count.to_string()
}

/// Render a Discord relative timestamp, like `<t:1700000000:R>`.
pub fn relative_timestamp(at: &DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn test_viewers() {
        assert_eq!(viewers(0), "0");
        assert_eq!(viewers(999), "999");
        assert_eq!(viewers(1000), "1K");
        assert_eq!(viewers(1250), "1.2K");
        assert_eq!(viewers(3_400_000), "3.4M");
        assert_eq!(viewers(150_000), "150K");
        assert_eq!(viewers(2_000_000_000), "2B");
    }

    #[test]
    fn test_compact_duration() {
        assert_eq!(compact_duration(Duration::from_secs(0)), "0s");
        assert_eq!(compact_duration(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(compact_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(compact_duration(Duration::from_secs(61)), "1m1s");
    }

    #[test]
    fn test_relative_timestamp() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(relative_timestamp(&at), "<t:1700000000:R>");
    }
}
