//! Datetime literal parsing and formatting.
//!
//! Literals without an explicit offset are taken in UTC so results do not
//! depend on the host timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a datetime literal. Accepts RFC 3339, naive datetime, and bare
/// date forms; returns `None` for everything else.
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(utc_fixed(naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(utc_fixed(date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

fn utc_fixed(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&naive).fixed_offset()
}

/// strftime-style formatting used by the DATETIME_FORMAT built-in.
pub fn format_datetime(dt: &DateTime<FixedOffset>, format: &str) -> String {
    dt.format(format).to_string()
}

/// Identity key component: nanoseconds since epoch.
pub fn epoch_nanos(dt: &DateTime<FixedOffset>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or_else(|| dt.timestamp() * 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_literal_forms() {
        let a = parse_datetime("2012-02-03 09:18:15").unwrap();
        let b = parse_datetime("2012-02-03T09:18:15Z").unwrap();
        assert_eq!(a, b);

        let d = parse_datetime("2012-02-03").unwrap();
        assert_eq!(format_datetime(&d, "%H:%M:%S"), "00:00:00");
    }

    #[test]
    fn offset_is_preserved() {
        let dt = parse_datetime("2012-02-03T09:18:15+09:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn rejects_non_datetimes() {
        assert!(parse_datetime("120").is_none());
        assert!(parse_datetime("str").is_none());
    }
}
