use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, Utc};

const TST_OFFSET_SECS: i32 = 8 * 3600;

/// Year offset of the minguo calendar used by TWSE date fields (year 1 = 1912).
pub const MINGUO_YEAR_OFFSET: i32 = 1911;

fn tst() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(TST_OFFSET_SECS).context("invalid Taipei offset")
}

/// Calendar date on the exchange (Asia/Taipei, no DST) for the given instant.
pub fn market_today(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    Ok(now_utc.with_timezone(&tst()?).date_naive())
}

/// Taipei wall-clock time for the given instant, used for `last_updated` stamps.
pub fn market_now(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDateTime> {
    Ok(now_utc.with_timezone(&tst()?).naive_local())
}

/// Exchange calendar date of an epoch-seconds timestamp.
pub fn date_from_epoch_seconds(secs: i64) -> Option<NaiveDate> {
    let offset = FixedOffset::east_opt(TST_OFFSET_SECS)?;
    let utc = DateTime::<Utc>::from_timestamp(secs, 0)?;
    Some(utc.with_timezone(&offset).date_naive())
}

pub fn start_of_day_epoch(date: NaiveDate) -> Option<i64> {
    let offset = FixedOffset::east_opt(TST_OFFSET_SECS)?;
    let local = date.and_hms_opt(0, 0, 0)?;
    Some(local.and_local_timezone(offset).single()?.timestamp())
}

pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

pub fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date - Duration::days(i64::from(days))
}

/// First day of every calendar month touching `[start, end]`, ascending.
pub fn month_starts(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let Some(mut cur) = NaiveDate::from_ymd_opt(start.year(), start.month(), 1) else {
        return out;
    };
    while cur <= end {
        out.push(cur);
        match cur.checked_add_months(Months::new(1)) {
            Some(next) => cur = next,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn market_date_rolls_over_at_taipei_midnight() {
        // 2026-01-05 16:30 UTC = 2026-01-06 00:30 TST
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 16, 30, 0).unwrap();
        assert_eq!(
            market_today(now).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()
        );

        let now = Utc.with_ymd_and_hms(2026, 1, 5, 15, 59, 0).unwrap();
        assert_eq!(
            market_today(now).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        );
    }

    #[test]
    fn epoch_seconds_map_to_taipei_calendar_date() {
        // 2024-01-02 01:00 UTC = 09:00 TST, the open of the trading day.
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap().timestamp();
        assert_eq!(
            date_from_epoch_seconds(ts),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );

        // 2024-01-01 20:00 UTC is already 2024-01-02 in Taipei.
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap().timestamp();
        assert_eq!(
            date_from_epoch_seconds(ts),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn month_starts_cover_partial_months_on_both_ends() {
        let start = NaiveDate::from_ymd_opt(2023, 11, 20).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap();
        let months = month_starts(start, end);
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2023, 11, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            ]
        );
    }

    #[test]
    fn month_starts_is_empty_when_start_after_end() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert!(month_starts(start, end).is_empty());
    }

    #[test]
    fn years_before_clamps_leap_day() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            years_before(d, 1),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
    }
}
