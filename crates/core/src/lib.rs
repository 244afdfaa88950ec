pub mod domain;
pub mod error;
pub mod ingest;
pub mod storage;
pub mod sync;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_DATA_DIR: &str = "stock_data";
    const DEFAULT_COMPANIES_PATH: &str = "companies.json";
    const DEFAULT_PROVIDERS: &str = "twse,yahoo";
    const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
    const DEFAULT_SYMBOL_DELAY_MS: u64 = 2000;
    const DEFAULT_MIN_RECORDS: usize = 50;
    const DEFAULT_PARTITION_STOP_RECORDS: usize = 1000;
    const DEFAULT_LOOKBACK_DAYS: u32 = 7;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_dir: PathBuf,
        pub companies_path: PathBuf,
        pub sentry_dsn: Option<String>,
        pub providers: Vec<String>,
        pub request_delay: Duration,
        pub symbol_delay: Duration,
        pub min_records: usize,
        pub partition_early_stop: bool,
        pub partition_stop_records: usize,
        pub refresh_lookback_days: u32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let providers = std::env::var("SYNC_PROVIDERS")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROVIDERS.to_string())
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>();

            let min_records = env_parse::<usize>("SYNC_MIN_RECORDS")?.unwrap_or(DEFAULT_MIN_RECORDS);
            anyhow::ensure!(min_records >= 1, "SYNC_MIN_RECORDS must be >= 1");

            let partition_stop_records = env_parse::<usize>("SYNC_PARTITION_STOP_RECORDS")?
                .unwrap_or(DEFAULT_PARTITION_STOP_RECORDS);
            anyhow::ensure!(
                partition_stop_records >= 1,
                "SYNC_PARTITION_STOP_RECORDS must be >= 1"
            );

            Ok(Self {
                data_dir: std::env::var("STOCK_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
                companies_path: std::env::var("COMPANIES_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_COMPANIES_PATH)),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                providers,
                request_delay: Duration::from_millis(
                    env_parse::<u64>("SYNC_REQUEST_DELAY_MS")?.unwrap_or(DEFAULT_REQUEST_DELAY_MS),
                ),
                symbol_delay: Duration::from_millis(
                    env_parse::<u64>("SYNC_SYMBOL_DELAY_MS")?.unwrap_or(DEFAULT_SYMBOL_DELAY_MS),
                ),
                min_records,
                partition_early_stop: env_parse::<bool>("SYNC_PARTITION_EARLY_STOP")?
                    .unwrap_or(true),
                partition_stop_records,
                refresh_lookback_days: env_parse::<u32>("SYNC_LOOKBACK_DAYS")?
                    .unwrap_or(DEFAULT_LOOKBACK_DAYS),
            })
        }
    }

    pub(crate) fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} has an invalid value: {s}")),
            _ => Ok(None),
        }
    }
}
