use crate::ingest::date::DateConvention;
use crate::ingest::provider::{get_text_with_retry, http_client, retries_from_env, PriceProvider};
use crate::ingest::types::{ProviderId, RangeHint, RawResponse, RowLayout};
use crate::time::tw_market::start_of_day_epoch;
use anyhow::{Context, Result};
use chrono::{Duration, Months, NaiveDate};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_SUFFIX: &str = ".TW";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YahooFormat {
    /// `v8/finance/chart`: parallel timestamp/close arrays.
    Chart,
    /// `v7/finance/download`: CSV rows.
    Csv,
}

#[derive(Debug, Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: String,
    suffix: String,
    format: YahooFormat,
    retries: u32,
}

impl YahooClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("YAHOO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let suffix =
            std::env::var("YAHOO_SYMBOL_SUFFIX").unwrap_or_else(|_| DEFAULT_SUFFIX.to_string());
        let format = match std::env::var("YAHOO_FORMAT")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "" | "chart" => YahooFormat::Chart,
            "csv" => YahooFormat::Csv,
            other => anyhow::bail!("YAHOO_FORMAT must be chart or csv (got {other})"),
        };

        Ok(Self {
            http: http_client("Yahoo", "YAHOO_TIMEOUT_SECS")?,
            base_url,
            suffix,
            format,
            retries: retries_from_env("YAHOO_RETRIES")?,
        })
    }

    fn ticker(&self, symbol: &str) -> String {
        format!("{symbol}{}", self.suffix)
    }

    fn url(&self, symbol: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.format {
            YahooFormat::Chart => format!("{base}/v8/finance/chart/{}", self.ticker(symbol)),
            YahooFormat::Csv => format!("{base}/v7/finance/download/{}", self.ticker(symbol)),
        }
    }
}

#[async_trait::async_trait]
impl PriceProvider for YahooClient {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    async fn fetch(&self, symbol: &str, range: RangeHint, today: NaiveDate) -> Result<RawResponse> {
        let mut query = range_query(range, today, self.format)?;
        query.push(("interval", "1d".to_string()));
        if self.format == YahooFormat::Csv {
            query.push(("events", "history".to_string()));
        }

        let text = get_text_with_retry(
            &self.http,
            &self.url(symbol),
            &query,
            HeaderMap::new(),
            self.retries,
            ProviderId::Yahoo,
        )
        .await?;

        match self.format {
            YahooFormat::Chart => parse_chart(&text),
            YahooFormat::Csv => parse_csv(&text),
        }
    }
}

fn range_query(
    range: RangeHint,
    today: NaiveDate,
    format: YahooFormat,
) -> Result<Vec<(&'static str, String)>> {
    let epoch = |d: NaiveDate| {
        start_of_day_epoch(d)
            .map(|s| s.to_string())
            .with_context(|| format!("date {d} out of epoch range"))
    };

    if range == RangeHint::Max && format == YahooFormat::Chart {
        return Ok(vec![("range", "max".to_string())]);
    }

    let start = range.start(today).unwrap_or(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(today));
    let end = match range {
        RangeHint::Month(first) => first
            .checked_add_months(Months::new(1))
            .unwrap_or(today + Duration::days(1)),
        _ => today + Duration::days(1),
    };

    Ok(vec![("period1", epoch(start)?), ("period2", epoch(end)?)])
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<Option<i64>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

pub(crate) fn parse_chart(text: &str) -> Result<RawResponse> {
    let env: ChartEnvelope =
        serde_json::from_str(text).context("failed to parse Yahoo chart response")?;

    if let Some(err) = env.chart.error.filter(|e| !e.is_null()) {
        return Ok(RawResponse::Empty {
            reason: err.to_string(),
        });
    }

    let Some(result) = env.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(RawResponse::Empty {
            reason: "chart result missing".to_string(),
        });
    };

    let closes = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .map(|q| q.close)
        .unwrap_or_default();

    if result.timestamp.is_empty() || closes.is_empty() {
        return Ok(RawResponse::Empty {
            reason: "chart has no bars".to_string(),
        });
    }

    Ok(RawResponse::Columnar {
        timestamps: result.timestamp,
        closes,
    })
}

pub(crate) fn parse_csv(text: &str) -> Result<RawResponse> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .context("failed to read Yahoo CSV header")?
        .clone();
    let position = |name: &str, fallback: usize| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .unwrap_or(fallback)
    };
    let layout = RowLayout {
        date_col: position("Date", 0),
        close_col: position("Close", 4),
        convention: DateConvention::Gregorian,
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed Yahoo CSV row")?;
        rows.push(record.iter().map(|c| Value::String(c.to_string())).collect());
    }

    if rows.is_empty() {
        return Ok(RawResponse::Empty {
            reason: "csv has no rows".to_string(),
        });
    }
    Ok(RawResponse::Rows { layout, rows })
}
