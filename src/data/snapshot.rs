//! Market snapshot engine
//! Turns raw closes into bounded per-instrument signals and merges them with macro rates

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::errors::{DataResult, InstrumentError};
use super::market::{
    Lookback, MarketDataClient, PriceBatch, PriceSeries, PriceSource, DEFAULT_SYMBOLS,
};
use super::rates::{fetch_macro_rates, FredClient, RateSource, RatesOutcome};

/// Trading days per year used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Trailing window for the z-score
pub const ZSCORE_WINDOW: usize = 30;

/// Keys the snapshot reserves next to the instrument identifiers
const RESERVED_KEYS: [&str; 3] = ["rates", "market_data_error", "rates_error"];

/// Statistical signals for one instrument, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InstrumentMetrics {
    pub price: f64,
    pub daily_change_pct: f64,
    pub z_score_30d: f64,
    pub volatility_annualized: f64,
}

/// Either the metrics or the reason there are none, never both
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum InstrumentResult {
    Metrics(InstrumentMetrics),
    Failed { error: InstrumentError },
}

impl InstrumentResult {
    pub fn metrics(&self) -> Option<&InstrumentMetrics> {
        match self {
            InstrumentResult::Metrics(m) => Some(m),
            InstrumentResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<InstrumentError> {
        match self {
            InstrumentResult::Metrics(_) => None,
            InstrumentResult::Failed { error } => Some(*error),
        }
    }
}

impl From<Result<InstrumentMetrics, InstrumentError>> for InstrumentResult {
    fn from(result: Result<InstrumentMetrics, InstrumentError>) -> Self {
        match result {
            Ok(metrics) => InstrumentResult::Metrics(metrics),
            Err(error) => InstrumentResult::Failed { error },
        }
    }
}

/// Compute price, daily change, 30-day z-score and annualized volatility.
///
/// `closes` must already be gap-free and ascending. Rounding happens once,
/// on the way out.
pub fn compute_metrics(closes: &[f64]) -> Result<InstrumentMetrics, InstrumentError> {
    let current = *closes.last().ok_or(InstrumentError::NoData)?;
    let previous = if closes.len() > 1 {
        closes[closes.len() - 2]
    } else {
        current
    };

    let daily_change_pct = if previous != 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    };

    let window = &closes[closes.len().saturating_sub(ZSCORE_WINDOW)..];
    let window_std = sample_std_dev(window);
    let z_score = if window_std != 0.0 {
        (current - mean(window)) / window_std
    } else {
        0.0
    };

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();
    let volatility = sample_std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt();

    Ok(InstrumentMetrics {
        price: round2(current),
        daily_change_pct: round2(daily_change_pct),
        z_score_30d: round2(z_score),
        volatility_annualized: round2(volatility),
    })
}

/// Metrics for one fetched series, or the per-identifier failure
pub fn evaluate_series(series: Option<&PriceSeries>) -> InstrumentResult {
    match series {
        None => InstrumentResult::Failed {
            error: InstrumentError::NotFound,
        },
        Some(series) => compute_metrics(&series.closes()).into(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); zero below two points or for a flat
/// series, where summation error would otherwise leave a tiny residue
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 || values.iter().all(|v| *v == values[0]) {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One cycle's view of the market. Built once, never mutated, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    instruments: Vec<(String, InstrumentResult)>,
    rates: RatesOutcome,
    market_data_error: Option<String>,
}

impl MarketSnapshot {
    /// Per-identifier results in request order
    pub fn instruments(&self) -> &[(String, InstrumentResult)] {
        &self.instruments
    }

    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentResult> {
        self.instruments
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, r)| r)
    }

    pub fn rates(&self) -> &RatesOutcome {
        &self.rates
    }

    /// Set only when the batched price fetch failed as a whole
    pub fn market_data_error(&self) -> Option<&str> {
        self.market_data_error.as_deref()
    }

    /// Set only when the rate source failed as a whole
    pub fn rates_error(&self) -> Option<&str> {
        match &self.rates {
            RatesOutcome::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }

    /// Pretty JSON handed to the grounding stage
    pub fn render(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for MarketSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;

        for (symbol, result) in &self.instruments {
            map.serialize_entry(symbol, result)?;
        }

        match &self.rates {
            RatesOutcome::Observed(rates) => map.serialize_entry("rates", rates)?,
            RatesOutcome::NotConfigured => {
                map.serialize_entry("rates", &json!({ "info": "not configured" }))?
            }
            RatesOutcome::Unavailable(_) => {}
        }

        if let Some(error) = &self.market_data_error {
            map.serialize_entry("market_data_error", error)?;
        }

        if let Some(reason) = self.rates_error() {
            map.serialize_entry("rates_error", reason)?;
        }

        map.end()
    }
}

/// Anything that can produce a snapshot; the grounding stage's tool
#[async_trait::async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn get_market_snapshot(&self, identifiers: Option<Vec<String>>) -> MarketSnapshot;
}

/// Composes the price fetcher, the rate fetcher and the computer
pub struct SnapshotEngine {
    prices: Arc<dyn PriceSource>,
    rates: Arc<dyn RateSource>,
    default_symbols: Vec<String>,
    lookback: Lookback,
}

impl SnapshotEngine {
    pub fn new(prices: Arc<dyn PriceSource>, rates: Arc<dyn RateSource>) -> Self {
        Self {
            prices,
            rates,
            default_symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            lookback: Lookback::default(),
        }
    }

    /// Production engine: Yahoo prices and FRED rates per configuration
    pub fn from_config(config: &crate::config::Config) -> DataResult<Self> {
        let prices = MarketDataClient::new(config.market.http_timeout_seconds)?;
        let rates = FredClient::new(
            config.apis.fred_api_key.clone(),
            config.market.http_timeout_seconds,
        )?;

        Ok(Self::new(Arc::new(prices), Arc::new(rates))
            .with_default_symbols(config.market.default_symbols.clone())
            .with_lookback(config.market.lookback))
    }

    pub fn with_default_symbols(mut self, symbols: Vec<String>) -> Self {
        if !symbols.is_empty() {
            self.default_symbols = symbols;
        }
        self
    }

    pub fn with_lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = lookback;
        self
    }

    /// Trim, drop blanks and reserved keys, dedupe in first-seen order.
    /// Nothing left means the default basket.
    fn resolve_symbols(&self, identifiers: Option<Vec<String>>) -> Vec<String> {
        let mut seen = HashSet::new();
        let symbols: Vec<String> = identifiers
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| {
                let reserved = RESERVED_KEYS.contains(&s.as_str());
                if reserved {
                    tracing::warn!(identifier = %s, "Ignoring identifier that collides with a snapshot key");
                }
                !reserved
            })
            .filter(|s| seen.insert(s.clone()))
            .collect();

        if symbols.is_empty() {
            self.default_symbols.clone()
        } else {
            symbols
        }
    }
}

#[async_trait::async_trait]
impl SnapshotProvider for SnapshotEngine {
    async fn get_market_snapshot(&self, identifiers: Option<Vec<String>>) -> MarketSnapshot {
        let symbols = self.resolve_symbols(identifiers);
        tracing::info!(symbols = ?symbols, "Building market snapshot");

        let (prices, rates) = tokio::join!(
            self.prices.fetch_closes(&symbols, self.lookback),
            fetch_macro_rates(self.rates.as_ref())
        );

        let (instruments, market_data_error) = match prices {
            Ok(batch) => (collect_instruments(&symbols, &batch), None),
            Err(e) => {
                tracing::error!("Market data batch fetch failed: {}", e);
                (Vec::new(), Some(format!("Failed to fetch market data: {}", e)))
            }
        };

        let failed = instruments
            .iter()
            .filter(|(_, r)| r.error().is_some())
            .count();
        tracing::info!(
            instruments = instruments.len(),
            failed,
            "Market snapshot ready"
        );

        MarketSnapshot {
            instruments,
            rates,
            market_data_error,
        }
    }
}

fn collect_instruments(symbols: &[String], batch: &PriceBatch) -> Vec<(String, InstrumentResult)> {
    symbols
        .iter()
        .map(|symbol| {
            let result = evaluate_series(batch.get(symbol));
            if let Some(error) = result.error() {
                tracing::warn!(symbol = %symbol, "Instrument unavailable: {}", error);
            }
            (symbol.clone(), result)
        })
        .collect()
}
