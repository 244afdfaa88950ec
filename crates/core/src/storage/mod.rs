use crate::domain::series::Series;
use anyhow::Result;

pub mod json_file;

/// One record per symbol. `load` distinguishes "absent" (`Ok(None)`) from "unreadable" (`Err`).
#[async_trait::async_trait]
pub trait SeriesStore: Send + Sync {
    async fn load(&self, symbol: &str) -> Result<Option<Series>>;

    async fn save(&self, symbol: &str, series: &Series) -> Result<()>;
}

/// Reads through to `inner` and discards writes.
pub struct DryRunStore<S> {
    inner: S,
}

impl<S> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<S: SeriesStore> SeriesStore for DryRunStore<S> {
    async fn load(&self, symbol: &str) -> Result<Option<Series>> {
        self.inner.load(symbol).await
    }

    async fn save(&self, symbol: &str, series: &Series) -> Result<()> {
        tracing::info!(
            %symbol,
            total_records = series.total_records,
            dry_run = true,
            "skipping series write"
        );
        Ok(())
    }
}
