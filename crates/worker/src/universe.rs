use std::collections::BTreeSet;
use twstock_core::domain::registry::{Company, Registry};

#[derive(Debug, Clone, Default)]
pub struct UniverseOptions {
    /// Explicit symbols to sync. Empty means every registry entry.
    pub symbols: Vec<String>,

    /// Cap on the number of symbols processed in one run.
    pub max_symbols: Option<usize>,
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("SYNC_SYMBOLS") {
            out.symbols = split_symbols(&s);
        }

        if let Ok(s) = std::env::var("SYNC_MAX_SYMBOLS") {
            if let Ok(n) = s.trim().parse::<usize>() {
                out.max_symbols = Some(n);
            }
        }

        out
    }
}

pub fn split_symbols(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves the run's targets against the registry, in registry order unless symbols were
/// named explicitly.
pub fn select_targets(registry: &Registry, opts: &UniverseOptions) -> anyhow::Result<Vec<(String, Company)>> {
    let mut out = Vec::new();

    if opts.symbols.is_empty() {
        out.extend(registry.iter().map(|(s, c)| (s.clone(), c.clone())));
    } else {
        let mut seen = BTreeSet::new();
        for symbol in &opts.symbols {
            if !seen.insert(symbol.as_str()) {
                continue;
            }
            let company = registry
                .get(symbol)
                .ok_or_else(|| anyhow::anyhow!("symbol {symbol} is not in the company registry"))?;
            out.push((symbol.clone(), company.clone()));
        }
    }

    if let Some(max) = opts.max_symbols {
        anyhow::ensure!(max >= 1, "SYNC_MAX_SYMBOLS must be >= 1");
        out.truncate(max);
    }

    Ok(out)
}
