use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Month boundaries, fiscal years and report periods are all evaluated in this zone unless configured otherwise.
pub const DEFAULT_BUSINESS_TIMEZONE: Tz = chrono_tz::Europe::Madrid;

/// The fiscal year a timestamp belongs to, i.e. the calendar year on the local clock of `tz`.
pub fn partition_year(ts: DateTime<Utc>, tz: Tz) -> i32 {
    ts.with_timezone(&tz).year()
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = next_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// The first and last instants of a local calendar month in `tz`, as an inclusive range. Returns `None` for an
/// invalid month.
pub fn month_bounds(year: i32, month: u32, tz: Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_midnight(year, month, tz)?;
    let (next_year, next_month) = next_month(year, month);
    let next = local_midnight(next_year, next_month, tz)?;
    Some((start, next - Duration::milliseconds(1)))
}

/// The (year, month) preceding the local month of `now`.
pub fn previous_month(now: DateTime<Utc>, tz: Tz) -> (i32, u32) {
    let local = now.with_timezone(&tz);
    match local.month() {
        1 => (local.year() - 1, 12),
        m => (local.year(), m - 1),
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn local_midnight(year: i32, month: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&naive).earliest().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod test {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn fiscal_year_follows_local_clock() {
        let tz = DEFAULT_BUSINESS_TIMEZONE;
        assert_eq!(partition_year(utc("2024-12-31T23:30:00Z"), tz), 2025);
        assert_eq!(partition_year(utc("2024-12-31T22:30:00Z"), tz), 2024);
    }

    #[test]
    fn winter_and_summer_month_bounds() {
        let tz = DEFAULT_BUSINESS_TIMEZONE;
        let (start, end) = month_bounds(2025, 1, tz).unwrap();
        assert_eq!(start, utc("2024-12-31T23:00:00Z"));
        assert_eq!(end, utc("2025-01-31T22:59:59.999Z"));
        let (start, end) = month_bounds(2025, 7, tz).unwrap();
        assert_eq!(start, utc("2025-06-30T22:00:00Z"));
        assert_eq!(end, utc("2025-07-31T21:59:59.999Z"));
        let (_, end) = month_bounds(2025, 12, tz).unwrap();
        assert_eq!(end, utc("2025-12-31T22:59:59.999Z"));
        assert!(month_bounds(2025, 13, tz).is_none());
        assert!(month_bounds(2025, 0, tz).is_none());
    }

    #[test]
    fn last_days() {
        assert_eq!(last_day_of_month(2024, 2), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(last_day_of_month(2025, 2), NaiveDate::from_ymd_opt(2025, 2, 28));
        assert_eq!(last_day_of_month(2025, 12), NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(last_day_of_month(2025, 0), None);
    }

    #[test]
    fn previous_months() {
        let tz = DEFAULT_BUSINESS_TIMEZONE;
        assert_eq!(previous_month(utc("2024-12-31T23:30:00Z"), tz), (2024, 12));
        assert_eq!(previous_month(utc("2025-03-01T00:00:00Z"), tz), (2025, 2));
    }
}
