use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

/// Calendar-month label used as a grouping key, e.g. "2024-01".
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Number of days in the inclusive window [start, end].
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

pub fn within(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    if let Some(s) = start {
        if date < s {
            return false;
        }
    }
    if let Some(e) = end {
        if date > e {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 12),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_month_key() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(month_key(date), "2024-01");
    }

    #[test]
    fn test_inclusive_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(inclusive_days(start, end), 31);
        assert_eq!(inclusive_days(start, start), 1);
    }

    #[test]
    fn test_within_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let july = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();

        assert!(within(date, Some(june), Some(july)));
        assert!(within(date, None, None));
        assert!(!within(date, Some(july), None));
        assert!(!within(date, None, Some(june)));
    }
}
