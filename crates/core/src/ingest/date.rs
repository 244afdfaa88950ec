use crate::error::UnparseableDate;
use crate::time::tw_market::{date_from_epoch_seconds, MINGUO_YEAR_OFFSET};
use chrono::NaiveDate;

/// How a provider writes its date fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateConvention {
    /// Detect from shape: 3-digit years are minguo, 4-digit years Gregorian, other
    /// all-digit values epoch seconds.
    #[default]
    Auto,
    Gregorian,
    MinorEra,
    EpochSeconds,
}

pub fn normalize_date(raw: &str, convention: DateConvention) -> Result<NaiveDate, UnparseableDate> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(UnparseableDate::new(raw, "empty"));
    }

    if convention == DateConvention::EpochSeconds {
        return from_epoch(raw, t);
    }

    if t.contains(['/', '-']) {
        let mut parts = t.split(['/', '-']);
        let (Some(y), Some(m), Some(d), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(UnparseableDate::new(raw, "expected three date components"));
        };
        return from_components(raw, y, m, d, convention);
    }

    if !t.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UnparseableDate::new(raw, "unrecognized date shape"));
    }

    match (convention, t.len()) {
        (DateConvention::Auto | DateConvention::MinorEra, 7) => {
            from_components(raw, &t[..3], &t[3..5], &t[5..], DateConvention::MinorEra)
        }
        (DateConvention::Auto | DateConvention::Gregorian, 8) => {
            from_components(raw, &t[..4], &t[4..6], &t[6..], DateConvention::Gregorian)
        }
        (DateConvention::MinorEra, 5 | 6) => {
            let split = t.len() - 4;
            from_components(raw, &t[..split], &t[split..split + 2], &t[split + 2..], convention)
        }
        (DateConvention::Auto, _) => from_epoch(raw, t),
        _ => Err(UnparseableDate::new(raw, "compact date has unexpected width")),
    }
}

pub fn normalize_epoch_seconds(secs: i64) -> Result<NaiveDate, UnparseableDate> {
    date_from_epoch_seconds(secs)
        .ok_or_else(|| UnparseableDate::new(&secs.to_string(), "timestamp out of range"))
}

fn from_epoch(raw: &str, t: &str) -> Result<NaiveDate, UnparseableDate> {
    let secs = t
        .parse::<i64>()
        .map_err(|_| UnparseableDate::new(raw, "epoch seconds are not an integer"))?;
    date_from_epoch_seconds(secs).ok_or_else(|| UnparseableDate::new(raw, "timestamp out of range"))
}

fn from_components(
    raw: &str,
    year: &str,
    month: &str,
    day: &str,
    convention: DateConvention,
) -> Result<NaiveDate, UnparseableDate> {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(year) || !digits(month) || !digits(day) {
        return Err(UnparseableDate::new(raw, "non-numeric date component"));
    }

    let is_era = match convention {
        DateConvention::MinorEra => year.len() <= 3,
        DateConvention::Gregorian => false,
        _ => year.len() == 3,
    };
    if !is_era && year.len() != 4 {
        return Err(UnparseableDate::new(raw, "unsupported year width"));
    }

    let parse = |s: &str| s.parse::<u32>().map_err(|_| UnparseableDate::new(raw, "component overflow"));
    let mut y = i32::try_from(parse(year)?).map_err(|_| UnparseableDate::new(raw, "component overflow"))?;
    if is_era {
        y += MINGUO_YEAR_OFFSET;
    }

    NaiveDate::from_ymd_opt(y, parse(month)?, parse(day)?)
        .ok_or_else(|| UnparseableDate::new(raw, "not a calendar date"))
}
