//! Market calendar policy: weekly categories only run on days the market
//! is closed. The default policy treats Saturday and Sunday as closed.
//!
//! All functions are pure; "today" is resolved by the caller through
//! [`today_in`] so decisions stay testable without clock mocking.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

/// True iff the civil date falls on a weekend.
pub fn is_market_closed(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Resolves an instant to the civil date in the given IANA timezone.
pub fn civil_date_in(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Today's civil date in the given IANA timezone.
pub fn today_in(tz: Tz) -> NaiveDate {
    civil_date_in(Utc::now(), tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weekend_is_closed() {
        // 2024-01-06 is a Saturday, 2024-01-07 a Sunday
        assert!(is_market_closed(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()));
        assert!(is_market_closed(NaiveDate::from_ymd_opt(2024, 1, 7).unwrap()));
    }

    #[test]
    fn test_weekday_is_open() {
        // 2024-01-08 is a Monday
        assert!(!is_market_closed(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()));
        assert!(!is_market_closed(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()));
    }

    #[test]
    fn test_civil_date_depends_on_zone() {
        // 03:00 UTC on Saturday is still Friday evening in New York but
        // Saturday noon in Tokyo.
        let instant = Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap();

        let new_york = civil_date_in(instant, chrono_tz::America::New_York);
        assert_eq!(new_york, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(!is_market_closed(new_york));

        let tokyo = civil_date_in(instant, chrono_tz::Asia::Tokyo);
        assert_eq!(tokyo, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        assert!(is_market_closed(tokyo));
    }
}
