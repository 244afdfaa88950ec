use crate::config::{env_parse, Settings};
use crate::ingest::twse::TwseClient;
use crate::ingest::types::{Partitioning, ProviderId, RangeHint, RawResponse};
use crate::ingest::yahoo::YahooClient;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub(crate) const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;
const MAX_BACKOFF_SECS: u64 = 60;
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[async_trait::async_trait]
pub trait PriceProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn partitioning(&self) -> Partitioning {
        Partitioning::Whole
    }

    /// Oldest date the provider can serve, when it documents one.
    fn earliest_date(&self) -> Option<NaiveDate> {
        None
    }

    /// One upstream request. Monthly providers receive `RangeHint::Month`.
    async fn fetch(&self, symbol: &str, range: RangeHint, today: NaiveDate) -> Result<RawResponse>;
}

pub fn build_providers(settings: &Settings) -> Result<Vec<Arc<dyn PriceProvider>>> {
    let mut out: Vec<Arc<dyn PriceProvider>> = Vec::with_capacity(settings.providers.len());
    for name in &settings.providers {
        match name.as_str() {
            "twse" => out.push(Arc::new(TwseClient::from_env()?)),
            "yahoo" => out.push(Arc::new(YahooClient::from_env()?)),
            other => anyhow::bail!("unknown provider in SYNC_PROVIDERS: {other}"),
        }
    }
    anyhow::ensure!(!out.is_empty(), "SYNC_PROVIDERS must name at least one provider");
    Ok(out)
}

pub(crate) fn http_client(label: &str, timeout_env: &str) -> Result<reqwest::Client> {
    let timeout_secs = env_parse::<u64>(timeout_env)?.unwrap_or(DEFAULT_TIMEOUT_SECS);
    anyhow::ensure!(timeout_secs >= 1, "{timeout_env} must be >= 1");

    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .with_context(|| format!("failed to build {label} http client"))
}

pub(crate) fn retries_from_env(key: &str) -> Result<u32> {
    check_retries(key, env_parse::<u32>(key)?)
}

fn check_retries(key: &str, value: Option<u32>) -> Result<u32> {
    let n = value.unwrap_or(DEFAULT_RETRIES);
    anyhow::ensure!(
        (1..=MAX_RETRIES).contains(&n),
        "{key} must be 1..={MAX_RETRIES} (got {n})"
    );
    Ok(n)
}

/// 1s, 2s, 4s, ... capped at `MAX_BACKOFF_SECS`.
fn backoff(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

/// GET with bounded retries on transport errors, 429 and 5xx. Returns the body text.
pub(crate) async fn get_text_with_retry(
    http: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
    headers: HeaderMap,
    max_attempts: u32,
    provider: ProviderId,
) -> Result<String> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        let res = http
            .get(url)
            .headers(headers.clone())
            .query(query)
            .send()
            .await;

        let res = match res {
            Ok(r) => r,
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(err).with_context(|| format!("{provider} request failed"));
                }
                let delay = backoff(attempt);
                tracing::warn!(attempt, ?delay, %provider, error = %err, "request failed; retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read {provider} response"))?;

        if !status.is_success() {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < max_attempts {
                let delay = backoff(attempt);
                tracing::warn!(attempt, ?delay, %provider, http_status = %status, "HTTP error; retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
            anyhow::bail!("{provider} HTTP {status}: {}", truncate(&text, 200));
        }

        return Ok(text);
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(7), Duration::from_secs(MAX_BACKOFF_SECS));
        assert_eq!(backoff(u32::MAX), Duration::from_secs(MAX_BACKOFF_SECS));
    }

    #[test]
    fn retries_are_bounded() {
        assert_eq!(check_retries("TWSE_RETRIES", None).unwrap(), DEFAULT_RETRIES);
        assert_eq!(check_retries("TWSE_RETRIES", Some(5)).unwrap(), 5);
        assert!(check_retries("TWSE_RETRIES", Some(0)).is_err());
        assert!(check_retries("TWSE_RETRIES", Some(65)).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("很抱歉沒有資料", 3), "很抱歉...");
        assert_eq!(truncate("short", 10), "short");
    }
}
