//! Read-side aggregations behind the lineup, check-in and dashboard views.
//!
//! Everything here is pure: handlers load rows and hand them in.

pub mod attendance;
pub mod lineup;
pub mod sales;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Calendar day of a stored date or timestamp.
///
/// Rows carry `YYYY-MM-DD`, RFC 3339 or `YYYY-MM-DD HH:MM:SS` depending on
/// where they were written from.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_day("2024-03-05"), expected);
        assert_eq!(parse_day("2024-03-05T23:10:00+07:00"), expected);
        assert_eq!(parse_day("2024-03-05 08:00:00"), expected);
        assert_eq!(parse_day("2024-03-05T08:00:00.123"), expected);
        assert_eq!(parse_day("March 5"), None);
        assert_eq!(parse_day(""), None);
    }
}
