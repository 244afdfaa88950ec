use crate::domain::registry::Company;
use crate::error::SyncError;
use crate::ingest::chain::{FallbackChain, RangePolicy};
use crate::storage::SeriesStore;
use crate::sync::merge::merge;
use crate::time::tw_market::{market_now, market_today};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Symbols without a stored series get a full-history fetch.
    Initialize,
    /// Only symbols with a stored series are touched.
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Initialized,
    Updated,
    Unchanged,
    Skipped,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initialized => "initialized",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug)]
pub struct SymbolReport {
    pub symbol: String,
    pub status: SyncStatus,
    pub new_records: usize,
    pub corrected_records: usize,
    pub total_records: usize,
    /// Set for `Failed`, and for `Skipped` when a reason is known.
    pub error: Option<anyhow::Error>,
}

impl SymbolReport {
    fn without_write(symbol: &str, status: SyncStatus, error: Option<anyhow::Error>) -> Self {
        Self {
            symbol: symbol.to_string(),
            status,
            new_records: 0,
            corrected_records: 0,
            total_records: 0,
            error,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub initialized: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub new_records: usize,
    pub corrected_records: usize,
    pub reports: Vec<SymbolReport>,
}

impl RunSummary {
    pub fn record(&mut self, report: SymbolReport) {
        match report.status {
            SyncStatus::Initialized => self.initialized += 1,
            SyncStatus::Updated => self.updated += 1,
            SyncStatus::Unchanged => self.unchanged += 1,
            SyncStatus::Skipped => self.skipped += 1,
            SyncStatus::Failed => self.failed += 1,
        }
        self.new_records += report.new_records;
        self.corrected_records += report.corrected_records;
        self.reports.push(report);
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SymbolReport> {
        self.reports.iter().filter(|r| r.status == SyncStatus::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub mode: SyncMode,
    pub refresh_lookback_days: u32,
    /// Re-fetch the full history even when a series exists.
    pub force_full: bool,
    /// Delay between consecutive symbols.
    pub symbol_pacing: Duration,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Refresh,
            refresh_lookback_days: 7,
            force_full: false,
            symbol_pacing: Duration::from_secs(2),
        }
    }
}

/// Drives load -> fetch -> merge -> save for one symbol at a time.
pub struct SyncPlanner<S> {
    store: S,
    chain: FallbackChain,
    options: PlannerOptions,
}

impl<S: SeriesStore> SyncPlanner<S> {
    pub fn new(store: S, chain: FallbackChain, options: PlannerOptions) -> Self {
        Self {
            store,
            chain,
            options,
        }
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Processes `targets` strictly in order. Never fails as a whole.
    pub async fn run(&self, targets: &[(String, Company)]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = targets.len();

        for (idx, (symbol, company)) in targets.iter().enumerate() {
            if idx != 0 {
                tokio::time::sleep(self.options.symbol_pacing).await;
            }

            let report = self.sync_at(symbol, company, Utc::now()).await;
            tracing::info!(
                processed = idx + 1,
                total,
                %symbol,
                name = %company.display_name(),
                status = %report.status,
                new_records = report.new_records,
                corrected_records = report.corrected_records,
                total_records = report.total_records,
                "symbol synced"
            );
            summary.record(report);
        }

        summary
    }

    pub async fn sync(&self, symbol: &str, company: &Company) -> SymbolReport {
        self.sync_at(symbol, company, Utc::now()).await
    }

    pub async fn sync_at(&self, symbol: &str, company: &Company, now_utc: DateTime<Utc>) -> SymbolReport {
        let (today, stamp) = match (market_today(now_utc), market_now(now_utc)) {
            (Ok(today), Ok(stamp)) => (today, stamp),
            (Err(err), _) | (_, Err(err)) => {
                return SymbolReport::without_write(symbol, SyncStatus::Failed, Some(err))
            }
        };

        let existing = match self.store.load(symbol).await {
            Ok(existing) => existing,
            Err(err) => {
                tracing::error!(%symbol, error = %format!("{err:#}"), "failed to load existing series");
                return SymbolReport::without_write(symbol, SyncStatus::Failed, Some(err));
            }
        };

        let policy = match (&existing, self.options.mode) {
            (None, SyncMode::Refresh) => {
                let err = SyncError::MissingPrerequisite {
                    symbol: symbol.to_string(),
                };
                tracing::warn!(%symbol, "{err}; run in initialize mode first");
                return SymbolReport::without_write(symbol, SyncStatus::Skipped, Some(err.into()));
            }
            (None, SyncMode::Initialize) => RangePolicy::full_history(company.ipo_date()),
            (Some(_), _) if self.options.force_full => RangePolicy::full_history(company.ipo_date()),
            (Some(_), _) => RangePolicy::trailing(self.options.refresh_lookback_days),
        };

        let (batch, used) = self.chain.resolve_policy(symbol, &policy, today).await;
        if batch.is_empty() {
            return match existing {
                None => {
                    let err = SyncError::NoDataFromAnySource {
                        symbol: symbol.to_string(),
                    };
                    SymbolReport::without_write(symbol, SyncStatus::Skipped, Some(err.into()))
                }
                Some(series) => SymbolReport {
                    total_records: series.total_records,
                    ..SymbolReport::without_write(symbol, SyncStatus::Unchanged, None)
                },
            };
        }

        tracing::debug!(
            %symbol,
            range = ?used,
            records = batch.len(),
            sources = ?batch.sources,
            "observations resolved"
        );

        let initializing = existing.is_none();
        let outcome = merge(existing, symbol, company.ipo_date(), &batch, stamp);

        if let Err(source) = self.store.save(symbol, &outcome.series).await {
            let err = SyncError::PersistenceFailure {
                symbol: symbol.to_string(),
                source,
            };
            tracing::error!(%symbol, error = %err, "series not saved");
            return SymbolReport::without_write(symbol, SyncStatus::Failed, Some(err.into()));
        }

        let status = if initializing {
            SyncStatus::Initialized
        } else if outcome.changed() {
            SyncStatus::Updated
        } else {
            SyncStatus::Unchanged
        };

        SymbolReport {
            symbol: symbol.to_string(),
            status,
            new_records: outcome.new_records,
            corrected_records: outcome.corrected_records,
            total_records: outcome.series.total_records,
            error: None,
        }
    }
}
