//! Submission date utilities

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::time::SystemTime;

/// Date formats accepted in legacy submission sheets
const SHEET_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const SHEET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a year-month-day token with or without separators
///
/// `20230715`, `2023-07-15` and `2023_07_15` all parse. Returns `None` when
/// the token is not eight digits or not a real calendar date.
pub fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()
}

/// Parse a date cell as written by spreadsheet exports
pub fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    SHEET_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            SHEET_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Local calendar date of a filesystem timestamp
pub fn local_date(time: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(time).date_naive()
}

/// ISO `YYYY-MM-DD` rendering used in report output
pub fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_and_dashed_dates() {
        let expected = NaiveDate::from_ymd_opt(2023, 7, 15);
        assert_eq!(parse_compact_date("20230715"), expected);
        assert_eq!(parse_compact_date("2023-07-15"), expected);
        assert_eq!(parse_compact_date("2023_07_15"), expected);
        assert_eq!(parse_compact_date("202307"), None);
    }

    #[test]
    fn test_impossible_date_rejected() {
        assert_eq!(parse_compact_date("20231399"), None);
        assert_eq!(parse_compact_date("2023-02-30"), None);
    }

    #[test]
    fn test_sheet_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2022, 7, 1);
        assert_eq!(parse_sheet_date("2022-07-01"), expected);
        assert_eq!(parse_sheet_date("07/01/2022"), expected);
        assert_eq!(parse_sheet_date("2022-07-01 00:00:00"), expected);
        assert_eq!(parse_sheet_date("  "), None);
        assert_eq!(parse_sheet_date("July"), None);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date(NaiveDate::from_ymd_opt(2021, 1, 2)),
            Some("2021-01-02".to_string())
        );
        assert_eq!(format_date(None), None);
    }
}
