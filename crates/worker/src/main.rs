use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twstock_core::config::Settings;
use twstock_core::domain::registry::{load_registry, Company};
use twstock_core::ingest::chain::{ChainConfig, FallbackChain};
use twstock_core::ingest::provider::build_providers;
use twstock_core::storage::json_file::JsonFileStore;
use twstock_core::storage::{DryRunStore, SeriesStore};
use twstock_core::sync::{PlannerOptions, RunSummary, SyncMode, SyncPlanner};

mod universe;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Fetch full history for symbols without a stored series, refresh the rest.
    Initialize,
    /// Refresh stored series over the trailing window only.
    Refresh,
}

impl From<Mode> for SyncMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Initialize => SyncMode::Initialize,
            Mode::Refresh => SyncMode::Refresh,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "twstock_worker")]
struct Args {
    #[arg(value_enum, default_value = "refresh")]
    mode: Mode,

    /// Series directory. Overrides STOCK_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Company registry. Overrides COMPANIES_PATH.
    #[arg(long)]
    companies: Option<PathBuf>,

    /// Only sync these symbols (repeatable or comma-separated). Overrides SYNC_SYMBOLS.
    #[arg(long = "symbol", value_delimiter = ',')]
    symbols: Vec<String>,

    /// Trailing window for refreshes, in days. Overrides SYNC_LOOKBACK_DAYS.
    #[arg(long)]
    lookback_days: Option<u32>,

    /// Re-fetch full history even for symbols that already have a series.
    #[arg(long)]
    full: bool,

    /// Do everything except writing series files.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(dir) = args.data_dir.clone() {
        settings.data_dir = dir;
    }
    if let Some(path) = args.companies.clone() {
        settings.companies_path = path;
    }
    if let Some(days) = args.lookback_days {
        settings.refresh_lookback_days = days;
    }

    let registry = load_registry(&settings.companies_path)?;
    let mut selection = universe::UniverseOptions::from_env();
    if !args.symbols.is_empty() {
        selection.symbols = universe::split_symbols(&args.symbols.join(","));
    }
    let targets = universe::select_targets(&registry, &selection)?;

    let chain = FallbackChain::new(
        build_providers(&settings)?,
        ChainConfig {
            sufficiency_threshold: settings.min_records,
            request_pacing: settings.request_delay,
            partition_early_stop: settings.partition_early_stop,
            partition_stop_records: settings.partition_stop_records,
        },
    );
    let options = PlannerOptions {
        mode: args.mode.into(),
        refresh_lookback_days: settings.refresh_lookback_days,
        force_full: args.full,
        symbol_pacing: settings.symbol_delay,
    };

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("sync_run", %run_id, mode = ?args.mode, dry_run = args.dry_run);

    async {
        tracing::info!(
            data_dir = %settings.data_dir.display(),
            companies = %settings.companies_path.display(),
            registry_len = registry.len(),
            targets_len = targets.len(),
            providers = ?settings.providers,
            lookback_days = settings.refresh_lookback_days,
            force_full = args.full,
            "starting sync run"
        );

        let store = JsonFileStore::new(&settings.data_dir);
        let summary = if args.dry_run {
            run(DryRunStore::new(store), chain, options, &targets).await
        } else {
            run(store, chain, options, &targets).await
        };

        report(run_id, &summary);
    }
    .instrument(span)
    .await;

    Ok(())
}

async fn run<S: SeriesStore>(
    store: S,
    chain: FallbackChain,
    options: PlannerOptions,
    targets: &[(String, Company)],
) -> RunSummary {
    SyncPlanner::new(store, chain, options).run(targets).await
}

fn report(run_id: uuid::Uuid, summary: &RunSummary) {
    for failed in summary.failures() {
        if let Some(err) = failed.error.as_ref() {
            sentry::with_scope(
                |scope| {
                    scope.set_tag("symbol", &failed.symbol);
                    scope.set_tag("run_id", run_id);
                },
                || sentry_anyhow::capture_anyhow(err),
            );
            tracing::error!(symbol = %failed.symbol, error = %format!("{err:#}"), "symbol failed");
        }
    }

    tracing::info!(
        total = summary.total(),
        initialized = summary.initialized,
        updated = summary.updated,
        unchanged = summary.unchanged,
        skipped = summary.skipped,
        failed = summary.failed,
        new_records = summary.new_records,
        corrected_records = summary.corrected_records,
        "sync run finished"
    );

    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "some symbols failed; rerun to retry them");
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
