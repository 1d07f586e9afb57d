//! Lenient date and time parsing for form and spreadsheet input
//!
//! Specimen labels were transcribed over many years, so dates arrive as
//! `27-Nov-2024`, `2024-11-27`, `11/27/2024`, Excel serial numbers and more.
//! Everything normalizes to ISO text before it reaches the database.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Accepted date formats, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d %b %Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%H%M", "%I:%M %p", "%I:%M%p"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a date in any accepted format.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(date);
    }
    // Spreadsheet cells that held a datetime.
    if let Some(dt) = parse_datetime(s) {
        return Some(dt.date());
    }
    excel_serial_date(s)
}

/// Parse a time of day in any accepted format.
pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .or_else(|| excel_serial_time(s))
}

/// Parse a timestamp: RFC 3339 first, then naive date-time forms.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parse a timestamp, accepting bare dates as midnight.
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    parse_datetime(input).or_else(|| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(input.trim(), fmt).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Excel stores dates as days since 1899-12-30. Small numbers are more
/// likely years or counts than dates, so serials start in 1927.
fn excel_serial_date(s: &str) -> Option<NaiveDate> {
    let serial: f64 = s.parse().ok()?;
    if !(10_000.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Fraction of a day, as Excel stores times.
fn excel_serial_time(s: &str) -> Option<NaiveTime> {
    let fraction: f64 = s.parse().ok()?;
    if !(0.0..1.0).contains(&fraction) {
        return None;
    }
    let secs = (fraction * 86_400.0).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs.min(86_399), 0)
}

/// ISO form stored in date columns.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `HH:MM[:SS]` form stored in time columns.
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_label_formats() {
        assert_eq!(parse_date("27-Nov-2024"), Some(ymd(2024, 11, 27)));
        assert_eq!(parse_date("2024-11-27"), Some(ymd(2024, 11, 27)));
        assert_eq!(parse_date("11/27/2024"), Some(ymd(2024, 11, 27)));
        assert_eq!(parse_date(" 27-November-2024 "), Some(ymd(2024, 11, 27)));
        assert_eq!(parse_date("2024-11-27 00:00:00"), Some(ymd(2024, 11, 27)));
    }

    #[test]
    fn parses_excel_serials() {
        assert_eq!(parse_date("45623"), Some(ymd(2024, 11, 27)));
        assert_eq!(parse_time("0.5"), NaiveTime::from_hms_opt(12, 0, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_date("sometime in spring"), None);
        assert_eq!(parse_date("2024"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_time("25:99"), None);
    }

    #[test]
    fn parses_military_time() {
        assert_eq!(parse_time("14:30"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_time("1430"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_time("2:30 PM"), NaiveTime::from_hms_opt(14, 30, 0));
    }

    #[test]
    fn timestamps_accept_bare_dates() {
        let ts = parse_timestamp("2024-11-27").unwrap();
        assert_eq!(format_timestamp(ts), "2024-11-27 00:00:00");
    }
}
