use crate::ingest::date::{normalize_date, DateConvention};
use anyhow::Context;
use chrono::NaiveDate;
use serde::de::{Error as _, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Static metadata for one tracked symbol, as listed in `companies.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Company {
    #[serde(default)]
    pub chinese_name: Option<String>,
    #[serde(default)]
    pub ipo_date: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

impl Company {
    /// Best-effort listing date; a malformed registry value is treated as unknown.
    pub fn ipo_date(&self) -> Option<NaiveDate> {
        let raw = self.ipo_date.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        normalize_date(raw, DateConvention::Auto).ok()
    }

    pub fn display_name(&self) -> &str {
        self.chinese_name.as_deref().unwrap_or("")
    }
}

/// Symbol -> company, in the order `companies.json` lists them.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<(String, Company)>,
}

impl Registry {
    pub fn get(&self, symbol: &str) -> Option<&Company> {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Company)> {
        self.entries.iter().map(|(s, c)| (s, c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for Registry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = Registry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of symbol -> company")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Registry, A::Error> {
                let mut seen = HashSet::new();
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((symbol, company)) = map.next_entry::<String, Company>()? {
                    if !seen.insert(symbol.clone()) {
                        return Err(A::Error::custom(format!("duplicate symbol {symbol}")));
                    }
                    entries.push((symbol, company));
                }
                Ok(Registry { entries })
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}

pub fn parse_registry(text: &str) -> anyhow::Result<Registry> {
    let registry: Registry =
        serde_json::from_str(text).context("companies registry is not a symbol -> company map")?;
    anyhow::ensure!(
        registry.iter().all(|(s, _)| !s.trim().is_empty()),
        "companies registry contains an empty symbol"
    );
    Ok(registry)
}

pub fn load_registry(path: &Path) -> anyhow::Result<Registry> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read companies registry {}", path.display()))?;
    parse_registry(&text).with_context(|| format!("invalid companies registry {}", path.display()))
}
