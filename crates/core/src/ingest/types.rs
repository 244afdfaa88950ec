use crate::ingest::date::DateConvention;
use crate::time::tw_market::{days_before, years_before};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Twse,
    Yahoo,
    /// Test doubles and ad-hoc sources.
    Other(&'static str),
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Twse => "twse",
            Self::Yahoo => "yahoo",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What span of history to ask a provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeHint {
    /// Whatever the provider can give.
    Max,
    Since(NaiveDate),
    Years(u32),
    Days(u32),
    /// A single calendar month, identified by its first day. Used for partitioned queries.
    Month(NaiveDate),
}

impl RangeHint {
    /// First day covered by the hint, or `None` when the provider decides (`Max`).
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match *self {
            Self::Max => None,
            Self::Since(d) | Self::Month(d) => Some(d),
            Self::Years(n) => Some(years_before(today, n)),
            Self::Days(n) => Some(days_before(today, n)),
        }
    }
}

impl fmt::Display for RangeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Since(d) => write!(f, "since {d}"),
            Self::Years(n) => write!(f, "{n}y"),
            Self::Days(n) => write!(f, "{n}d"),
            Self::Month(d) => write!(f, "month {}", d.format("%Y-%m")),
        }
    }
}

/// How a provider's history has to be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partitioning {
    /// One request covers the whole range.
    Whole,
    /// One request per calendar month (`RangeHint::Month`).
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub date_col: usize,
    pub close_col: usize,
    pub convention: DateConvention,
}

/// A provider payload reduced to the shapes the extractor understands.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Rows { layout: RowLayout, rows: Vec<Vec<Value>> },
    Columnar { timestamps: Vec<Option<i64>>, closes: Vec<Option<f64>> },
    /// The provider answered but has nothing for the requested range.
    Empty { reason: String },
}

/// Date -> close observations from one or more fetch attempts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationBatch {
    pub prices: BTreeMap<NaiveDate, f64>,
    /// Providers that contributed at least one observation. Diagnostics only.
    pub sources: Vec<ProviderId>,
}

impl ObservationBatch {
    pub fn from_prices(provider: ProviderId, prices: BTreeMap<NaiveDate, f64>) -> Self {
        let sources = if prices.is_empty() { Vec::new() } else { vec![provider] };
        Self { prices, sources }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Adds dates not yet present; existing dates keep their value. Returns how many were added.
    pub fn absorb(&mut self, other: ObservationBatch) -> usize {
        let mut added = 0;
        for (date, price) in other.prices {
            if let std::collections::btree_map::Entry::Vacant(e) = self.prices.entry(date) {
                e.insert(price);
                added += 1;
            }
        }
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        added
    }
}
