use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// `m:ss`, rounding fractional averages to the nearest second.
pub fn format_wait(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.round() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

fn postcode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)[A-Z]{1,2}[0-9][0-9A-Z]?\s?[0-9][A-Z]{2}").expect("postcode pattern is valid")
    })
}

/// UK postcode from the last comma-separated part of an address.
pub fn extract_postcode(formatted_address: &str) -> Option<&str> {
    let last = formatted_address.rsplit(',').next()?.trim();
    postcode_pattern().find(last).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn wait_formatting() {
        assert_eq!(format_wait(0.0), "0:00");
        assert_eq!(format_wait(65.0), "1:05");
        assert_eq!(format_wait(1199.0), "19:59");
        assert_eq!(format_wait(119.6), "2:00");
        assert_eq!(format_wait(f64::NAN), "0:00");
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(format_time_ago(now - Duration::seconds(20), now), "just now");
        assert_eq!(format_time_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_time_ago(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_time_ago(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_time_ago(now + Duration::minutes(1), now), "just now");
    }

    #[test]
    fn postcode_from_address() {
        assert_eq!(
            extract_postcode("The Crown, 1 High St, London SW1A 1AA"),
            Some("SW1A 1AA")
        );
        assert_eq!(extract_postcode("12 Market Sq, Leeds ls1 6dt"), Some("ls1 6dt"));
        assert_eq!(extract_postcode("Somewhere, Paris"), None);
        assert_eq!(extract_postcode(""), None);
    }
}
