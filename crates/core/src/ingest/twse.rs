use crate::ingest::date::DateConvention;
use crate::ingest::provider::{get_text_with_retry, http_client, retries_from_env, PriceProvider};
use crate::ingest::types::{Partitioning, ProviderId, RangeHint, RawResponse, RowLayout};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_URL: &str = "https://www.twse.com.tw/exchangeReport/STOCK_DAY";

// Column positions of STOCK_DAY rows when `fields` is missing:
// 日期, 成交股數, 成交金額, 開盤價, 最高價, 最低價, 收盤價, 漲跌價差, 成交筆數
const DATE_COL: usize = 0;
const CLOSE_COL: usize = 6;
const DATE_FIELD: &str = "日期";
const CLOSE_FIELD: &str = "收盤價";

/// Earliest month STOCK_DAY serves; used when asked for the maximum range.
pub fn history_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Exchange-official daily trading report. Serves one calendar month per request.
#[derive(Debug, Clone)]
pub struct TwseClient {
    http: reqwest::Client,
    url: String,
    retries: u32,
}

impl TwseClient {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("TWSE_STOCK_DAY_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Ok(Self {
            http: http_client("TWSE", "TWSE_TIMEOUT_SECS")?,
            url,
            retries: retries_from_env("TWSE_RETRIES")?,
        })
    }
}

#[async_trait::async_trait]
impl PriceProvider for TwseClient {
    fn id(&self) -> ProviderId {
        ProviderId::Twse
    }

    fn partitioning(&self) -> Partitioning {
        Partitioning::Monthly
    }

    fn earliest_date(&self) -> Option<NaiveDate> {
        Some(history_start())
    }

    async fn fetch(&self, symbol: &str, range: RangeHint, _today: NaiveDate) -> Result<RawResponse> {
        let RangeHint::Month(month) = range else {
            anyhow::bail!("TWSE STOCK_DAY is queried one month at a time, got range {range}");
        };

        let query = [
            ("response", "json".to_string()),
            ("date", month.format("%Y%m01").to_string()),
            ("stockNo", symbol.to_string()),
        ];
        let text = get_text_with_retry(
            &self.http,
            &self.url,
            &query,
            HeaderMap::new(),
            self.retries,
            ProviderId::Twse,
        )
        .await?;

        parse_stock_day(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StockDayResponse {
    #[serde(default)]
    stat: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

pub(crate) fn parse_stock_day(text: &str) -> Result<RawResponse> {
    let body: StockDayResponse =
        serde_json::from_str(text).context("failed to parse TWSE STOCK_DAY response")?;

    if !body.stat.trim().eq_ignore_ascii_case("OK") || body.data.is_empty() {
        let reason = if body.stat.trim().is_empty() {
            "empty data".to_string()
        } else {
            body.stat
        };
        return Ok(RawResponse::Empty { reason });
    }

    let position = |name: &str, fallback: usize| {
        body.fields
            .iter()
            .position(|f| f.trim() == name)
            .unwrap_or(fallback)
    };

    Ok(RawResponse::Rows {
        layout: RowLayout {
            date_col: position(DATE_FIELD, DATE_COL),
            close_col: position(CLOSE_FIELD, CLOSE_COL),
            convention: DateConvention::Auto,
        },
        rows: body.data,
    })
}
