use crate::error::SyncError;
use crate::ingest::extract::extract;
use crate::ingest::provider::PriceProvider;
use crate::ingest::types::{ObservationBatch, Partitioning, RangeHint};
use crate::time::tw_market::{month_starts, years_before};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

// How far back a monthly provider walks for `RangeHint::Max` when it has no documented floor.
const MONTHLY_MAX_YEARS: u32 = 20;

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Distinct dates after which no further provider is queried.
    pub sufficiency_threshold: usize,
    /// Delay after every upstream request.
    pub request_pacing: Duration,
    /// Stop a month-by-month walk once `partition_stop_records` dates are accumulated.
    pub partition_early_stop: bool,
    /// Dates after which a month walk ends. Months are walked newest first, so only the
    /// oldest history is cut.
    pub partition_stop_records: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sufficiency_threshold: 50,
            request_pacing: Duration::from_secs(1),
            partition_early_stop: true,
            partition_stop_records: 1000,
        }
    }
}

/// Ordered range hints tried until one yields data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePolicy(pub Vec<RangeHint>);

impl RangePolicy {
    /// From the listing date when known (else the provider maximum), then progressively
    /// shorter windows.
    pub fn full_history(ipo_date: Option<NaiveDate>) -> Self {
        let first = ipo_date.map(RangeHint::Since).unwrap_or(RangeHint::Max);
        Self(vec![
            first,
            RangeHint::Years(10),
            RangeHint::Years(5),
            RangeHint::Years(2),
            RangeHint::Years(1),
        ])
    }

    pub fn trailing(days: u32) -> Self {
        Self(vec![RangeHint::Days(days)])
    }
}

pub struct FallbackChain {
    providers: Vec<Arc<dyn PriceProvider>>,
    config: ChainConfig,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>, config: ChainConfig) -> Self {
        Self { providers, config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Tries each hint of `policy` in order and returns the first non-empty result.
    pub async fn resolve_policy(
        &self,
        symbol: &str,
        policy: &RangePolicy,
        today: NaiveDate,
    ) -> (ObservationBatch, Option<RangeHint>) {
        for (idx, range) in policy.0.iter().enumerate() {
            let batch = self.resolve(symbol, *range, today).await;
            if !batch.is_empty() {
                return (batch, Some(*range));
            }
            if idx + 1 < policy.0.len() {
                tracing::info!(%symbol, %range, "range yielded no data; trying next range");
            }
        }
        (ObservationBatch::default(), None)
    }

    /// Queries providers in priority order, accumulating until the sufficiency threshold is
    /// met or the providers run out. Never fails; provider errors count as empty answers.
    pub async fn resolve(&self, symbol: &str, range: RangeHint, today: NaiveDate) -> ObservationBatch {
        let mut acc = ObservationBatch::default();

        for provider in &self.providers {
            if self.is_sufficient(&acc) {
                tracing::debug!(
                    %symbol,
                    provider = %provider.id(),
                    records = acc.len(),
                    "threshold met; not querying further providers"
                );
                break;
            }

            let before = acc.len();
            match provider.partitioning() {
                Partitioning::Whole => {
                    let batch = self.fetch_attempt(provider.as_ref(), symbol, range, today).await;
                    acc.absorb(batch);
                }
                Partitioning::Monthly => {
                    self.fetch_monthly(provider.as_ref(), symbol, range, today, &mut acc)
                        .await;
                }
            }

            tracing::info!(
                %symbol,
                provider = %provider.id(),
                %range,
                added = acc.len() - before,
                total = acc.len(),
                threshold = self.config.sufficiency_threshold,
                "provider pass complete"
            );
        }

        if acc.is_empty() {
            let err = SyncError::NoDataFromAnySource {
                symbol: symbol.to_string(),
            };
            tracing::warn!(%range, "{err}");
        }
        acc
    }

    fn is_sufficient(&self, acc: &ObservationBatch) -> bool {
        acc.len() >= self.config.sufficiency_threshold
    }

    async fn fetch_monthly(
        &self,
        provider: &dyn PriceProvider,
        symbol: &str,
        range: RangeHint,
        today: NaiveDate,
        acc: &mut ObservationBatch,
    ) {
        let floor = provider.earliest_date();
        let start = match range.start(today) {
            Some(start) => floor.map_or(start, |f| start.max(f)),
            None => floor.unwrap_or_else(|| years_before(today, MONTHLY_MAX_YEARS)),
        };

        let months = match range {
            RangeHint::Month(first) => vec![first],
            _ => {
                let mut months = month_starts(start, today);
                months.reverse();
                months
            }
        };
        let total_months = months.len();

        for (idx, month) in months.into_iter().enumerate() {
            let batch = self
                .fetch_attempt(provider, symbol, RangeHint::Month(month), today)
                .await;
            let got = batch.len();
            acc.absorb(batch);

            tracing::debug!(
                %symbol,
                provider = %provider.id(),
                month = %month.format("%Y-%m"),
                records = got,
                total = acc.len(),
                "month fetched"
            );

            if self.config.partition_early_stop
                && acc.len() >= self.config.partition_stop_records
                && idx + 1 < total_months
            {
                tracing::info!(
                    %symbol,
                    provider = %provider.id(),
                    months_fetched = idx + 1,
                    months_skipped = total_months - idx - 1,
                    "month walk limit reached; skipping older months"
                );
                break;
            }
        }
    }

    async fn fetch_attempt(
        &self,
        provider: &dyn PriceProvider,
        symbol: &str,
        range: RangeHint,
        today: NaiveDate,
    ) -> ObservationBatch {
        let res = provider.fetch(symbol, range, today).await;
        tokio::time::sleep(self.config.request_pacing).await;

        match res {
            Ok(raw) => extract(&raw, provider.id()),
            Err(source) => {
                let err = SyncError::ProviderUnavailable {
                    provider: provider.id().as_str(),
                    source,
                };
                tracing::warn!(%symbol, %range, error = %err, "provider attempt failed; treating as empty");
                ObservationBatch::default()
            }
        }
    }
}
