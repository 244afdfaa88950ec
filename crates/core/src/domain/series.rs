use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Canonical daily-close record for one symbol, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub symbol: String,
    #[serde(default)]
    pub ipo_date: Option<NaiveDate>,
    #[serde(with = "wall_clock")]
    pub last_updated: NaiveDateTime,
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub prices: BTreeMap<NaiveDate, f64>,
}

impl Series {
    pub fn new(symbol: impl Into<String>, ipo_date: Option<NaiveDate>, now: NaiveDateTime) -> Self {
        Self {
            symbol: symbol.into(),
            ipo_date,
            last_updated: now,
            total_records: 0,
            date_range: None,
            prices: BTreeMap::new(),
        }
    }

    /// Rebuilds `total_records` and `date_range` from `prices`.
    pub fn recompute_derived(&mut self) {
        self.total_records = self.prices.len();
        self.date_range = match (self.prices.keys().next(), self.prices.keys().next_back()) {
            (Some(start), Some(end)) => Some(DateRange {
                start: *start,
                end: *end,
            }),
            _ => None,
        };
    }

    pub fn is_consistent(&self) -> bool {
        let mut probe = self.clone();
        probe.recompute_derived();
        probe.total_records == self.total_records
            && probe.date_range == self.date_range
            && self.prices.values().all(|p| p.is_finite() && *p >= 0.0)
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.prices.keys().next_back().copied()
    }
}

/// Rounds a close to the 2 fraction digits stored in a series.
pub fn round_price(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

mod wall_clock {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), FORMAT)
            .or_else(|_| raw.trim().parse::<NaiveDateTime>())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn derived_fields_track_price_keys() {
        let mut s = Series::new("2330", None, ts("2024-01-05 18:00:00"));
        s.recompute_derived();
        assert_eq!(s.total_records, 0);
        assert_eq!(s.date_range, None);

        s.prices.insert(d("2024-01-03"), 101.5);
        s.prices.insert(d("2024-01-02"), 100.0);
        assert!(!s.is_consistent());
        s.recompute_derived();
        assert!(s.is_consistent());
        assert_eq!(s.total_records, 2);
        assert_eq!(
            s.date_range,
            Some(DateRange {
                start: d("2024-01-02"),
                end: d("2024-01-03"),
            })
        );
    }

    #[test]
    fn serializes_in_record_layout_with_sorted_prices() {
        let mut s = Series::new("2330", Some(d("1994-09-05")), ts("2024-01-05 18:00:00"));
        s.prices.insert(d("2024-01-03"), 101.5);
        s.prices.insert(d("2024-01-02"), 100.0);
        s.recompute_derived();

        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(
            v,
            json!({
                "symbol": "2330",
                "ipo_date": "1994-09-05",
                "last_updated": "2024-01-05 18:00:00",
                "total_records": 2,
                "date_range": {"start": "2024-01-02", "end": "2024-01-03"},
                "prices": {"2024-01-02": 100.0, "2024-01-03": 101.5},
            })
        );

        let text = serde_json::to_string(&s).unwrap();
        assert!(text.find("2024-01-02").unwrap() < text.find("2024-01-03").unwrap());
    }

    #[test]
    fn accepts_legacy_records_without_derived_fields() {
        let v = json!({
            "symbol": "2317",
            "ipo_date": "1991-06-18",
            "last_updated": "2023-12-29 20:15:03",
            "data_source": "yfinance_max_period",
            "prices": {"2023-12-28": 104.5, "2023-12-29": 105.0},
        });
        let mut s: Series = serde_json::from_value(v).unwrap();
        assert_eq!(s.total_records, 0);
        s.recompute_derived();
        assert_eq!(s.total_records, 2);
        assert_eq!(s.latest_date(), Some(d("2023-12-29")));
    }

    #[test]
    fn rounds_to_two_fraction_digits() {
        assert_eq!(round_price(1234.5649), 1234.56);
        assert_eq!(round_price(12.3456), 12.35);
        assert_eq!(round_price(12.0), 12.0);
    }
}
