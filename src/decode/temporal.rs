//! Date, time and timestamp parsing
//!
//! `AUTO` mode tries a fixed, ordered list of layouts. The first layout that
//! parses the whole input wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::TemporalFormat;

const TIMESTAMP_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%Y/%m/%d"];

const TIME_LAYOUTS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Parse a timestamp under `format`
pub fn parse_timestamp(input: &str, format: &TemporalFormat) -> Result<NaiveDateTime, String> {
    let input = input.trim();
    match format {
        TemporalFormat::Fixed(pattern) => NaiveDateTime::parse_from_str(input, pattern)
            .or_else(|_| {
                NaiveDate::parse_from_str(input, pattern)
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .map_err(|e| format!("does not match '{}': {}", pattern, e)),
        TemporalFormat::Auto => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
                return Ok(dt.naive_utc());
            }
            if let Some(ts) = TIMESTAMP_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
            {
                return Ok(ts);
            }
            if let Some(date) = parse_auto_date(input) {
                return Ok(date.and_time(NaiveTime::MIN));
            }
            if let Ok(secs) = input.parse::<i64>()
                && let Some(dt) = DateTime::from_timestamp(secs, 0)
            {
                return Ok(dt.naive_utc());
            }
            Err("not a recognised timestamp".to_string())
        }
    }
}

fn parse_auto_date(input: &str) -> Option<NaiveDate> {
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(input, layout).ok())
}

/// Parse a date under `format`
///
/// In `AUTO` mode a timestamp is accepted and truncated to its date.
pub fn parse_date(input: &str, format: &TemporalFormat) -> Result<NaiveDate, String> {
    let input = input.trim();
    match format {
        TemporalFormat::Fixed(pattern) => NaiveDate::parse_from_str(input, pattern)
            .map_err(|e| format!("does not match '{}': {}", pattern, e)),
        TemporalFormat::Auto => parse_auto_date(input)
            .or_else(|| {
                if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
                    return Some(dt.naive_utc().date());
                }
                TIMESTAMP_LAYOUTS
                    .iter()
                    .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
                    .map(|ts| ts.date())
            })
            .ok_or_else(|| "not a recognised date".to_string()),
    }
}

/// Parse a time of day under `format`
pub fn parse_time(input: &str, format: &TemporalFormat) -> Result<NaiveTime, String> {
    let input = input.trim();
    match format {
        TemporalFormat::Fixed(pattern) => NaiveTime::parse_from_str(input, pattern)
            .map_err(|e| format!("does not match '{}': {}", pattern, e)),
        TemporalFormat::Auto => TIME_LAYOUTS
            .iter()
            .find_map(|layout| NaiveTime::parse_from_str(input, layout).ok())
            .ok_or_else(|| "not a recognised time".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn auto_timestamps() {
        let auto = TemporalFormat::Auto;
        let expected = ymd(2018, 1, 1).and_hms_milli_opt(0, 1, 5, 647).unwrap();
        assert_eq!(parse_timestamp("2018-01-01 00:01:05.6470", &auto), Ok(expected));
        assert_eq!(
            parse_timestamp("2008-06-17 20:40:23", &auto),
            Ok(ymd(2008, 6, 17).and_hms_opt(20, 40, 23).unwrap())
        );
        assert_eq!(
            parse_timestamp("2016-08-13T14:02:00Z", &auto),
            Ok(ymd(2016, 8, 13).and_hms_opt(14, 2, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2008-01-05", &auto),
            Ok(ymd(2008, 1, 5).and_hms_opt(0, 0, 0).unwrap())
        );
        assert!(parse_timestamp("yesterday", &auto).is_err());
    }

    #[test]
    fn auto_dates() {
        let auto = TemporalFormat::Auto;
        assert_eq!(parse_date("2008-01-05", &auto), Ok(ymd(2008, 1, 5)));
        assert_eq!(parse_date("01/05/2008", &auto), Ok(ymd(2008, 1, 5)));
        assert_eq!(parse_date("05-Jan-2008", &auto), Ok(ymd(2008, 1, 5)));
        assert_eq!(parse_date("2008-01-05 10:00:00", &auto), Ok(ymd(2008, 1, 5)));
        assert!(parse_date("2008-13-45", &auto).is_err());
    }

    #[test]
    fn fixed_formats() {
        let fixed = TemporalFormat::Fixed("%d/%m/%Y".to_string());
        assert_eq!(parse_date("05/01/2008", &fixed), Ok(ymd(2008, 1, 5)));
        assert!(parse_date("2008-01-05", &fixed).is_err());

        let time = TemporalFormat::Fixed("%H%M".to_string());
        assert_eq!(parse_time("0930", &time), Ok(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
    }

    #[test]
    fn auto_times() {
        let auto = TemporalFormat::Auto;
        assert_eq!(
            parse_time("14:30", &auto),
            Ok(NaiveTime::from_hms_opt(14, 30, 0).unwrap())
        );
        assert_eq!(
            parse_time("2:30 PM", &auto),
            Ok(NaiveTime::from_hms_opt(14, 30, 0).unwrap())
        );
    }
}
