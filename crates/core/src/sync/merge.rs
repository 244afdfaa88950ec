use crate::domain::series::Series;
use crate::ingest::types::ObservationBatch;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::btree_map::Entry;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub series: Series,
    /// Dates that were not in the existing series.
    pub new_records: usize,
    /// Existing dates whose close was revised upstream.
    pub corrected_records: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.new_records > 0 || self.corrected_records > 0
    }
}

/// Folds `incoming` into `existing` (or a fresh series when absent).
///
/// Incoming values win on conflict; dates only ever get added. Derived fields are rebuilt and
/// `last_updated` advances to `now` unless the series already carries a later stamp.
pub fn merge(
    existing: Option<Series>,
    symbol: &str,
    ipo_date: Option<NaiveDate>,
    incoming: &ObservationBatch,
    now: NaiveDateTime,
) -> MergeOutcome {
    let mut series = existing.unwrap_or_else(|| Series::new(symbol, ipo_date, now));
    let mut new_records = 0;
    let mut corrected_records = 0;

    for (date, price) in &incoming.prices {
        match series.prices.entry(*date) {
            Entry::Vacant(e) => {
                e.insert(*price);
                new_records += 1;
            }
            Entry::Occupied(mut e) => {
                if *e.get() != *price {
                    tracing::debug!(
                        %symbol,
                        %date,
                        old = *e.get(),
                        new = *price,
                        "close revised upstream"
                    );
                    e.insert(*price);
                    corrected_records += 1;
                }
            }
        }
    }

    series.recompute_derived();
    series.last_updated = series.last_updated.max(now);

    MergeOutcome {
        series,
        new_records,
        corrected_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::DateRange;
    use crate::ingest::types::ProviderId;
    use std::collections::BTreeMap;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn batch(entries: &[(&str, f64)]) -> ObservationBatch {
        ObservationBatch::from_prices(
            ProviderId::Yahoo,
            entries.iter().map(|(k, v)| (d(k), *v)).collect::<BTreeMap<_, _>>(),
        )
    }

    fn existing() -> Series {
        merge(
            None,
            "2330",
            None,
            &batch(&[("2024-01-02", 100.0), ("2024-01-03", 101.5)]),
            ts("2024-01-03 18:00:00"),
        )
        .series
    }

    #[test]
    fn adds_only_new_dates_and_leaves_equal_prices() {
        let out = merge(
            Some(existing()),
            "2330",
            None,
            &batch(&[("2024-01-03", 101.5), ("2024-01-04", 99.0)]),
            ts("2024-01-04 18:00:00"),
        );
        assert_eq!(out.new_records, 1);
        assert_eq!(out.corrected_records, 0);
        assert_eq!(
            out.series.prices,
            BTreeMap::from([
                (d("2024-01-02"), 100.0),
                (d("2024-01-03"), 101.5),
                (d("2024-01-04"), 99.0),
            ])
        );
        assert_eq!(out.series.total_records, 3);
        assert_eq!(
            out.series.date_range,
            Some(DateRange {
                start: d("2024-01-02"),
                end: d("2024-01-04"),
            })
        );
    }

    #[test]
    fn revised_close_overwrites_without_counting_as_new() {
        let before = existing();
        let out = merge(
            Some(before.clone()),
            "2330",
            None,
            &batch(&[("2024-01-02", 102.0)]),
            ts("2024-01-04 09:30:00"),
        );
        assert_eq!(out.new_records, 0);
        assert_eq!(out.corrected_records, 1);
        assert!(out.changed());
        assert_eq!(out.series.prices[&d("2024-01-02")], 102.0);
        assert!(out.series.last_updated > before.last_updated);
    }

    #[test]
    fn absent_series_with_empty_batch_yields_empty_series() {
        let out = merge(None, "2330", Some(d("1994-09-05")), &batch(&[]), ts("2024-01-04 18:00:00"));
        assert!(out.series.prices.is_empty());
        assert_eq!(out.series.date_range, None);
        assert_eq!(out.series.total_records, 0);
        assert_eq!(out.series.ipo_date, Some(d("1994-09-05")));
        assert!(!out.changed());
    }

    #[test]
    fn applying_the_same_batch_twice_is_idempotent() {
        let b = batch(&[("2024-01-02", 100.25), ("2024-01-05", 98.0), ("2024-01-08", 97.5)]);
        let now = ts("2024-01-08 18:00:00");

        let once = merge(Some(existing()), "2330", None, &b, now);
        let twice = merge(Some(once.series.clone()), "2330", None, &b, now);
        assert_eq!(twice.series, once.series);
        assert_eq!(twice.new_records, 0);
        assert_eq!(twice.corrected_records, 0);
    }

    #[test]
    fn coverage_never_shrinks_and_derived_fields_stay_consistent() {
        let base = existing();
        let b = batch(&[("2023-12-29", 95.0)]);
        let out = merge(Some(base.clone()), "2330", None, &b, ts("2024-01-08 18:00:00"));

        assert!(base.prices.keys().all(|k| out.series.prices.contains_key(k)));
        assert!(out.series.is_consistent());
        assert_eq!(out.series.date_range.map(|r| r.start), Some(d("2023-12-29")));
    }

    #[test]
    fn last_updated_never_moves_backwards() {
        let base = existing();
        let out = merge(
            Some(base.clone()),
            "2330",
            None,
            &batch(&[("2024-01-04", 99.0)]),
            ts("2023-06-01 00:00:00"),
        );
        assert_eq!(out.series.last_updated, base.last_updated);
    }
}
