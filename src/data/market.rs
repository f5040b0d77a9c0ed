//! Instrument series fetcher
//! Retrieves daily closes for a basket of symbols in one batched call

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::{DataError, DataResult};

/// Broad equity, tech, small caps, long bond, gold, crypto
pub const DEFAULT_SYMBOLS: [&str; 6] = ["SPY", "QQQ", "IWM", "TLT", "GLD", "BTC-USD"];

const YAHOO_SPARK_URL: &str = "https://query1.finance.yahoo.com/v7/finance/spark";

/// Calendar lookback window for the price history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lookback {
    OneMonth,
    #[default]
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl Lookback {
    pub fn as_range(&self) -> &'static str {
        match self {
            Lookback::OneMonth => "1mo",
            Lookback::ThreeMonths => "3mo",
            Lookback::SixMonths => "6mo",
            Lookback::OneYear => "1y",
        }
    }
}

impl std::str::FromStr for Lookback {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1mo" => Ok(Lookback::OneMonth),
            "3mo" => Ok(Lookback::ThreeMonths),
            "6mo" => Ok(Lookback::SixMonths),
            "1y" => Ok(Lookback::OneYear),
            other => Err(DataError::Config(format!(
                "Unsupported lookback '{}' (expected 1mo, 3mo, 6mo or 1y)",
                other
            ))),
        }
    }
}

/// One daily close; `None` marks a gap reported by the source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

/// Ascending daily closes for one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            symbol: symbol.into(),
            points,
        }
    }

    /// Closing values with gaps and non-finite entries removed, in date order
    pub fn closes(&self) -> Vec<f64> {
        self.points
            .iter()
            .filter_map(|p| p.close)
            .filter(|c| c.is_finite())
            .collect()
    }
}

/// Result of one batched fetch, keyed by symbol. Requested symbols the
/// source did not return are simply absent.
pub type PriceBatch = HashMap<String, PriceSeries>;

/// Source of daily closing prices.
///
/// One call covers every symbol. An `Err` means the whole batch failed;
/// per-symbol gaps are expressed by absence from the returned map.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_closes(&self, symbols: &[String], lookback: Lookback) -> DataResult<PriceBatch>;
}

/// Yahoo Finance spark API response structures
#[derive(Debug, Deserialize)]
struct SparkResponse {
    spark: SparkBody,
}

#[derive(Debug, Deserialize)]
struct SparkBody {
    #[serde(default)]
    result: Option<Vec<SparkResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SparkResult {
    symbol: String,
    #[serde(default)]
    response: Vec<SparkChart>,
}

#[derive(Debug, Deserialize)]
struct SparkChart {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: SparkIndicators,
}

#[derive(Debug, Deserialize)]
struct SparkIndicators {
    #[serde(default)]
    quote: Vec<SparkQuote>,
}

#[derive(Debug, Deserialize)]
struct SparkQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Market data client backed by the Yahoo Finance spark endpoint
pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl MarketDataClient {
    pub fn new(timeout_seconds: u64) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("market-interpreter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: YAHOO_SPARK_URL.to_string(),
        })
    }

    fn build_url(&self, symbols: &[String], lookback: Lookback) -> DataResult<Url> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("symbols", symbols.join(",").as_str()),
                ("range", lookback.as_range()),
                ("interval", "1d"),
            ],
        )
        .map_err(|e| DataError::Internal(format!("Invalid spark URL: {}", e)))
    }
}

#[async_trait]
impl PriceSource for MarketDataClient {
    async fn fetch_closes(&self, symbols: &[String], lookback: Lookback) -> DataResult<PriceBatch> {
        tracing::info!(
            symbols = symbols.len(),
            range = lookback.as_range(),
            "Fetching daily closes"
        );

        let url = self.build_url(symbols, lookback)?;
        tracing::debug!("Yahoo spark request: GET {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            tracing::error!("Yahoo spark API failed ({}): {}", status_code, error_text);
            return Err(DataError::api_error(status_code, error_text));
        }

        let body = response.text().await?;
        let batch = parse_spark_response(&body)?;

        tracing::info!(
            "Fetched price history for {}/{} symbols",
            batch.len(),
            symbols.len()
        );
        Ok(batch)
    }
}

/// Parse a spark payload into per-symbol series
fn parse_spark_response(body: &str) -> DataResult<PriceBatch> {
    let parsed: SparkResponse = serde_json::from_str(body)
        .map_err(|e| DataError::parse_error(format!("Failed to parse spark response: {}", e)))?;

    if let Some(error) = parsed.spark.error.filter(|e| !e.is_null()) {
        return Err(DataError::Internal(format!("Yahoo spark error: {}", error)));
    }

    let mut batch = PriceBatch::new();
    for result in parsed.spark.result.unwrap_or_default() {
        let points = match result.response.into_iter().next() {
            Some(chart) => chart_points(chart)?,
            None => Vec::new(),
        };
        batch.insert(result.symbol.clone(), PriceSeries::new(result.symbol, points));
    }

    Ok(batch)
}

fn chart_points(chart: SparkChart) -> DataResult<Vec<PricePoint>> {
    let timestamps = chart.timestamp.unwrap_or_default();
    let closes = chart
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| DataError::parse_error(format!("Invalid timestamp: {}", ts)))?
            .date_naive();

        points.push(PricePoint {
            date,
            close: closes.get(i).copied().flatten(),
        });
    }

    points.sort_by_key(|p| p.date);
    Ok(points)
}
