use chrono::{Datelike, FixedOffset, NaiveDate, Weekday};

/// Indian Standard Time. The NSE trading day, the opening baseline and the
/// log timestamps are all IST-based.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
}

// -----------------------------------------------
// NSE HOLIDAYS 2025
// -----------------------------------------------
const NSE_HOLIDAYS_2025: &[(u32, u32)] = &[
    (1, 26),
    (2, 26),
    (3, 14),
    (3, 31),
    (4, 10),
    (4, 14),
    (4, 18),
    (5, 1),
    (8, 15),
    (8, 27),
    (10, 2),
    (10, 21),
    (10, 22),
    (11, 5),
    (12, 25),
];

fn is_holiday(date: NaiveDate) -> bool {
    date.year() == 2025
        && NSE_HOLIDAYS_2025
            .iter()
            .any(|&(m, d)| date.month() == m && date.day() == d)
}

/// Weekday and not an exchange holiday.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// Roll back to the latest trading day on or before `date`.
pub fn last_trading_day(date: NaiveDate) -> NaiveDate {
    let mut d = date;
    while !is_trading_day(d) {
        d = d.pred_opt().expect("date underflow");
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekend_is_not_trading_day() {
        // 2025-04-12 is a Saturday
        assert!(!is_trading_day(date(2025, 4, 12)));
        assert!(!is_trading_day(date(2025, 4, 13)));
        assert!(is_trading_day(date(2025, 4, 11)));
    }

    #[test]
    fn test_holiday_is_not_trading_day() {
        // Good Friday 2025
        assert!(!is_trading_day(date(2025, 4, 18)));
    }

    #[test]
    fn test_rollback_over_long_weekend() {
        // 2025-04-18 (Fri, holiday), 19-20 weekend → Monday 21st rolls to Thursday 17th
        assert_eq!(last_trading_day(date(2025, 4, 20)), date(2025, 4, 17));
        // A plain trading day maps to itself
        assert_eq!(last_trading_day(date(2025, 4, 16)), date(2025, 4, 16));
    }
}
