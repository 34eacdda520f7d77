//! Target dates and the naive weekday calendar.
//!
//! Holidays are not modeled: a trading day is any Monday through Friday.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which bar a run resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// The most recent bar each source has.
    Latest,
    /// The bar for exactly this date.
    Date(NaiveDate),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => f.write_str("latest"),
            Target::Date(d) => write!(f, "{d}"),
        }
    }
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Step back one day from `today`, then keep stepping back over weekends.
pub fn most_recent_trading_day(today: NaiveDate) -> NaiveDate {
    let mut day = today - Duration::days(1);
    while !is_trading_day(day) {
        day -= Duration::days(1);
    }
    day
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn midweek_steps_back_one_day() {
        // Thursday -> Wednesday
        assert_eq!(most_recent_trading_day(d(2024, 5, 2)), d(2024, 5, 1));
    }

    #[test]
    fn monday_steps_back_to_friday() {
        assert_eq!(most_recent_trading_day(d(2024, 5, 6)), d(2024, 5, 3));
    }

    #[test]
    fn weekend_steps_back_to_friday() {
        assert_eq!(most_recent_trading_day(d(2024, 5, 4)), d(2024, 5, 3));
        assert_eq!(most_recent_trading_day(d(2024, 5, 5)), d(2024, 5, 3));
    }

    #[test]
    fn holidays_are_trading_days() {
        // 2024-07-04 is a Thursday; the naive rule does not know it is closed.
        assert_eq!(most_recent_trading_day(d(2024, 7, 5)), d(2024, 7, 4));
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::Latest.to_string(), "latest");
        assert_eq!(Target::Date(d(2024, 5, 1)).to_string(), "2024-05-01");
    }

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_iso_date(" 2024-05-01 ").unwrap(), d(2024, 5, 1));
        assert!(parse_iso_date("05/01/2024").is_err());
    }
}
