use thiserror::Error;

/// A single date value that could not be mapped onto a calendar date.
/// Callers drop the offending record and keep going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable date '{raw}': {reason}")]
pub struct UnparseableDate {
    pub raw: String,
    pub reason: &'static str,
}

impl UnparseableDate {
    pub(crate) fn new(raw: &str, reason: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// Per-symbol failure taxonomy. None of these abort a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("record {index} from {provider} skipped: {detail}")]
    UnparseableRecord {
        provider: &'static str,
        index: usize,
        detail: String,
    },

    #[error("provider {provider} unavailable: {source:#}")]
    ProviderUnavailable {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("no data from any configured provider for {symbol}")]
    NoDataFromAnySource { symbol: String },

    #[error("failed to persist series for {symbol}: {source:#}")]
    PersistenceFailure {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no existing series for {symbol} and no initialization path configured")]
    MissingPrerequisite { symbol: String },
}
