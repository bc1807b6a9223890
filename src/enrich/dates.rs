//! Free-text date-range parsing for scraped profiles.
//!
//! Providers return ranges like "Nov 2022 - May 2023" or "May 2021 -
//! Present". Parsed to month precision: starts land on the 1st, ends on the
//! 28th (always a valid day), open ranges ("Present") have no end.

use chrono::NaiveDate;

/// Parse a provider date range into `(start, end)`. Either side may be
/// `None` when unparseable; a "Present" end is `None` by definition.
pub fn parse_date_range(raw: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (None, None);
    }

    let Some((start_str, end_str)) = raw.split_once('-') else {
        // A bare "May 2021" is an open-ended start
        return (parse_month_year(raw, 1), None);
    };

    let start = parse_month_year(start_str.trim(), 1);
    let end_str = end_str.trim();
    let end = if end_str.to_lowercase().contains("present") {
        None
    } else {
        parse_month_year(end_str, 28)
    };

    (start, end)
}

/// Parse "Nov 2022", "November 2022", or "2022" to a date on the given day.
fn parse_month_year(raw: &str, day: u32) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%b %Y", "%B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw} {day}"), &format!("{format} %d"))
        {
            return Some(date);
        }
    }
    // Year only
    if let Ok(year) = raw.parse::<i32>() {
        if (1900..=2100).contains(&year) {
            return NaiveDate::from_ymd_opt(year, 1, day);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_closed_range() {
        let (start, end) = parse_date_range("Nov 2022 - May 2023");
        assert_eq!(start, Some(date(2022, 11, 1)));
        assert_eq!(end, Some(date(2023, 5, 28)));
    }

    #[test]
    fn test_present_range_is_open() {
        let (start, end) = parse_date_range("May 2021 - Present");
        assert_eq!(start, Some(date(2021, 5, 1)));
        assert_eq!(end, None);
    }

    #[test]
    fn test_full_month_names_and_years() {
        let (start, end) = parse_date_range("January 2019 - 2021");
        assert_eq!(start, Some(date(2019, 1, 1)));
        assert_eq!(end, Some(date(2021, 1, 28)));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_date_range(""), (None, None));
        assert_eq!(parse_date_range("whenever - whenever"), (None, None));
    }

    #[test]
    fn test_bare_start() {
        let (start, end) = parse_date_range("May 2021");
        assert_eq!(start, Some(date(2021, 5, 1)));
        assert_eq!(end, None);
    }
}
