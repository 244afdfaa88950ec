use crate::domain::series::Series;
use crate::storage::SeriesStore;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// `<root>/<symbol>.json`, pretty-printed UTF-8.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, symbol: &str) -> Result<PathBuf> {
        let ok = !symbol.is_empty()
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !symbol.starts_with('.');
        anyhow::ensure!(ok, "symbol {symbol:?} cannot be used as a file name");
        Ok(self.root.join(format!("{symbol}.json")))
    }
}

#[async_trait::async_trait]
impl SeriesStore for JsonFileStore {
    async fn load(&self, symbol: &str) -> Result<Option<Series>> {
        let path = self.path_for(symbol)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        let mut series: Series = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a valid series record", path.display()))?;
        anyhow::ensure!(
            series.symbol == symbol,
            "{} holds series for {}, expected {symbol}",
            path.display(),
            series.symbol
        );
        if let Some((date, price)) = series
            .prices
            .iter()
            .find(|(_, p)| !p.is_finite() || **p < 0.0)
        {
            anyhow::bail!("{} has an invalid close {price} on {date}", path.display());
        }
        if !series.is_consistent() {
            tracing::debug!(%symbol, "stored derived fields were stale; recomputed on load");
            series.recompute_derived();
        }
        Ok(Some(series))
    }

    async fn save(&self, symbol: &str, series: &Series) -> Result<()> {
        let path = self.path_for(symbol)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let mut body = serde_json::to_string_pretty(series).context("failed to encode series")?;
        body.push('\n');

        // Readers only ever see the old record or the complete new one.
        let tmp = self.root.join(format!(".{symbol}.json.tmp"));
        tokio::fs::write(&tmp, body.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err).with_context(|| format!("failed to replace {}", path.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::tempdir;

    fn sample() -> Series {
        let now = NaiveDateTime::parse_from_str("2024-01-05 18:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let mut s = Series::new("2330", NaiveDate::from_ymd_opt(1994, 9, 5), now);
        s.prices.insert(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 593.0);
        s.prices.insert(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 578.0);
        s.recompute_derived();
        s
    }

    #[tokio::test]
    async fn missing_record_loads_as_absent() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("stock_data"));
        assert!(store.load("2330").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_series() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("stock_data"));
        let series = sample();

        store.save("2330", &series).await.unwrap();
        let loaded = store.load("2330").await.unwrap().unwrap();
        assert_eq!(loaded, series);

        let text = std::fs::read_to_string(dir.path().join("stock_data/2330.json")).unwrap();
        assert!(text.contains("\"last_updated\": \"2024-01-05 18:00:00\""));
        assert!(!dir.path().join("stock_data/.2330.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error_not_absent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("2330.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("2330").await.is_err());
    }

    #[tokio::test]
    async fn stale_derived_fields_are_recomputed_on_load() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("2317.json"),
            r#"{
                "symbol": "2317",
                "ipo_date": null,
                "last_updated": "2023-12-29 20:15:03",
                "total_records": 99,
                "prices": {"2023-12-28": 104.5, "2023-12-29": 105.0}
            }"#,
        )
        .unwrap();
        let store = JsonFileStore::new(dir.path());
        let s = store.load("2317").await.unwrap().unwrap();
        assert_eq!(s.total_records, 2);
        assert_eq!(
            s.date_range.map(|r| r.end),
            NaiveDate::from_ymd_opt(2023, 12, 29)
        );
    }

    #[tokio::test]
    async fn negative_close_is_rejected_and_file_left_alone() {
        let dir = tempdir().unwrap();
        let body = r#"{
            "symbol": "2330",
            "last_updated": "2024-01-05 18:00:00",
            "total_records": 2,
            "date_range": {"start": "2024-01-02", "end": "2024-01-03"},
            "prices": {"2024-01-02": 593.0, "2024-01-03": -578.0}
        }"#;
        std::fs::write(dir.path().join("2330.json"), body).unwrap();
        let store = JsonFileStore::new(dir.path());

        let err = store.load("2330").await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid close"));
        assert_eq!(std::fs::read_to_string(dir.path().join("2330.json")).unwrap(), body);
    }

    #[test]
    fn rejects_path_like_symbols() {
        let store = JsonFileStore::new("stock_data");
        assert!(store.path_for("../etc").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("2330").is_ok());
    }
}
