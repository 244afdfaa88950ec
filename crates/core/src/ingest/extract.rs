use crate::domain::series::round_price;
use crate::error::SyncError;
use crate::ingest::date::{normalize_date, normalize_epoch_seconds, DateConvention};
use crate::ingest::types::{ObservationBatch, ProviderId, RawResponse, RowLayout};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

/// Turns a provider payload into date -> close observations.
///
/// Bad rows are dropped one at a time; a payload with no usable rows yields an empty batch.
pub fn extract(raw: &RawResponse, provider: ProviderId) -> ObservationBatch {
    let prices = match raw {
        RawResponse::Rows { layout, rows } => extract_rows(layout, rows, provider),
        RawResponse::Columnar { timestamps, closes } => extract_columnar(timestamps, closes, provider),
        RawResponse::Empty { reason } => {
            tracing::debug!(%provider, %reason, "provider reported no data");
            BTreeMap::new()
        }
    };
    ObservationBatch::from_prices(provider, prices)
}

fn extract_rows(
    layout: &RowLayout,
    rows: &[Vec<Value>],
    provider: ProviderId,
) -> BTreeMap<NaiveDate, f64> {
    let mut out = BTreeMap::new();
    let mut skipped: usize = 0;
    for (index, row) in rows.iter().enumerate() {
        match parse_row(layout, row) {
            Ok((date, close)) => {
                out.insert(date, close);
            }
            Err(detail) => {
                skipped += 1;
                let err = SyncError::UnparseableRecord {
                    provider: provider.as_str(),
                    index,
                    detail,
                };
                tracing::debug!(error = %err, "skipping row");
            }
        }
    }
    if skipped > 0 {
        tracing::debug!(%provider, skipped, kept = out.len(), "rows skipped during extraction");
    }
    out
}

fn parse_row(layout: &RowLayout, row: &[Value]) -> Result<(NaiveDate, f64), String> {
    let date_cell = row
        .get(layout.date_col)
        .ok_or_else(|| format!("row has {} cells, no date column", row.len()))?;
    let close_cell = row
        .get(layout.close_col)
        .ok_or_else(|| format!("row has {} cells, no close column", row.len()))?;

    let date = parse_date_cell(date_cell, layout.convention)?;
    let close = parse_price_cell(close_cell).ok_or_else(|| format!("unusable close {close_cell}"))?;
    Ok((date, close))
}

fn parse_date_cell(cell: &Value, convention: DateConvention) -> Result<NaiveDate, String> {
    let res = match cell {
        Value::String(s) => normalize_date(s, convention),
        Value::Number(n) => match n.as_i64() {
            Some(secs) if convention == DateConvention::EpochSeconds => normalize_epoch_seconds(secs),
            Some(v) => normalize_date(&v.to_string(), convention),
            None => return Err(format!("non-integer date {n}")),
        },
        other => return Err(format!("unusable date {other}")),
    };
    res.map_err(|e| e.to_string())
}

fn parse_price_cell(cell: &Value) -> Option<f64> {
    let v = match cell {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_num(s)?,
        _ => return None,
    };
    to_close(v)
}

/// Parses a numeric string, ignoring thousands separators.
pub fn parse_num(s: &str) -> Option<f64> {
    let t: String = s.trim().chars().filter(|c| *c != ',').collect();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok()
}

fn to_close(v: f64) -> Option<f64> {
    (v.is_finite() && v >= 0.0).then(|| round_price(v))
}

fn extract_columnar(
    timestamps: &[Option<i64>],
    closes: &[Option<f64>],
    provider: ProviderId,
) -> BTreeMap<NaiveDate, f64> {
    if timestamps.len() != closes.len() {
        tracing::debug!(
            %provider,
            timestamps = timestamps.len(),
            closes = closes.len(),
            "columnar arrays differ in length; pairing the common prefix"
        );
    }

    let mut out = BTreeMap::new();
    for (index, (ts, close)) in timestamps.iter().zip(closes.iter()).enumerate() {
        let (Some(ts), Some(close)) = (ts, close) else {
            continue;
        };
        let Some(close) = to_close(*close) else {
            tracing::debug!(%provider, index, close, "skipping unusable close");
            continue;
        };
        match normalize_epoch_seconds(*ts) {
            Ok(date) => {
                out.insert(date, close);
            }
            Err(err) => tracing::debug!(%provider, index, error = %err, "skipping index"),
        }
    }
    out
}
