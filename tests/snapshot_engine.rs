use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use market_interpreter::data::{
    DataError, DataResult, FredClient, InstrumentError, Lookback, PriceBatch, PricePoint, PriceSeries,
    PriceSource, RateSource, RatesOutcome, SnapshotEngine, SnapshotProvider, DEFAULT_SYMBOLS,
    MACRO_SERIES,
};

/// Price source serving fixed closes, or failing the whole batch
struct MockPrices {
    series: Vec<(&'static str, Vec<Option<f64>>)>,
    fail: bool,
    requested: Mutex<Vec<String>>,
}

impl MockPrices {
    fn with(series: Vec<(&'static str, Vec<Option<f64>>)>) -> Self {
        Self {
            series,
            fail: false,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            series: Vec::new(),
            fail: true,
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PriceSource for MockPrices {
    async fn fetch_closes(&self, symbols: &[String], _lookback: Lookback) -> DataResult<PriceBatch> {
        self.requested
            .lock()
            .expect("requested lock")
            .extend(symbols.iter().cloned());

        if self.fail {
            return Err(DataError::api_error(503, "price source down"));
        }

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        Ok(self
            .series
            .iter()
            .map(|(symbol, closes)| {
                let points = closes
                    .iter()
                    .enumerate()
                    .map(|(i, close)| PricePoint {
                        date: start + chrono::Duration::days(i as i64),
                        close: *close,
                    })
                    .collect();
                (symbol.to_string(), PriceSeries::new(*symbol, points))
            })
            .collect())
    }
}

/// Rate source with a call counter
struct MockRates {
    configured: bool,
    fail: bool,
    calls: AtomicUsize,
}

impl MockRates {
    fn new(configured: bool, fail: bool) -> Self {
        Self {
            configured,
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RateSource for MockRates {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn latest_observation(&self, _series_code: &str) -> DataResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(DataError::api_error(500, "rate source down"))
        } else {
            Ok(4.2)
        }
    }
}

fn flat(level: f64, n: usize) -> Vec<Option<f64>> {
    vec![Some(level); n]
}

#[tokio::test]
async fn test_single_identifier_metrics() {
    let prices = Arc::new(MockPrices::with(vec![(
        "AAPL",
        vec![Some(100.0), Some(102.0), Some(101.0), Some(105.0), Some(103.0)],
    )]));
    let engine = SnapshotEngine::new(prices, Arc::new(MockRates::new(false, false)));

    let snapshot = engine
        .get_market_snapshot(Some(vec!["AAPL".to_string()]))
        .await;

    assert_eq!(snapshot.instruments().len(), 1);
    let metrics = snapshot
        .instrument("AAPL")
        .and_then(|r| r.metrics())
        .expect("AAPL metrics");
    assert_eq!(metrics.price, 103.0);
    assert_eq!(metrics.daily_change_pct, -1.9);
    assert_eq!(metrics.z_score_30d, 0.42);
    assert!(metrics.volatility_annualized >= 0.0);
}

#[tokio::test]
async fn test_default_basket_when_no_identifiers() {
    let series = DEFAULT_SYMBOLS
        .iter()
        .map(|s| (*s, flat(50.0, 40)))
        .collect();
    let prices = Arc::new(MockPrices::with(series));
    let engine = SnapshotEngine::new(prices.clone(), Arc::new(MockRates::new(false, false)));

    let snapshot = engine.get_market_snapshot(None).await;

    let keys: Vec<&str> = snapshot.instruments().iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(keys, DEFAULT_SYMBOLS.to_vec());

    let value = serde_json::to_value(&snapshot).expect("snapshot json");
    let object = value.as_object().expect("json object");
    assert_eq!(object.len(), DEFAULT_SYMBOLS.len() + 1);
    assert!(object.contains_key("rates"));

    // Empty list behaves like no list
    let snapshot = engine.get_market_snapshot(Some(Vec::new())).await;
    assert_eq!(snapshot.instruments().len(), DEFAULT_SYMBOLS.len());
}

#[tokio::test]
async fn test_batch_failure_keeps_rates() {
    let engine = SnapshotEngine::new(
        Arc::new(MockPrices::failing()),
        Arc::new(MockRates::new(true, false)),
    );

    let snapshot = engine.get_market_snapshot(None).await;

    assert!(snapshot.instruments().is_empty());
    let error = snapshot.market_data_error().expect("market data error");
    assert!(error.contains("price source down"));

    match snapshot.rates() {
        RatesOutcome::Observed(rates) => assert_eq!(rates.len(), MACRO_SERIES.len()),
        other => panic!("expected rates to survive, got {:?}", other),
    }

    let value = serde_json::to_value(&snapshot).expect("snapshot json");
    assert!(value.get("market_data_error").is_some());
    assert!(value.get("SPY").is_none());
}

#[tokio::test]
async fn test_missing_identifier_isolated() {
    let prices = Arc::new(MockPrices::with(vec![
        ("SPY", flat(400.0, 10)),
        ("GLD", vec![None, None]),
    ]));
    let engine = SnapshotEngine::new(prices, Arc::new(MockRates::new(false, false)));

    let snapshot = engine
        .get_market_snapshot(Some(vec![
            "SPY".to_string(),
            "NOPE".to_string(),
            "GLD".to_string(),
        ]))
        .await;

    assert!(snapshot.instrument("SPY").and_then(|r| r.metrics()).is_some());
    assert_eq!(
        snapshot.instrument("NOPE").and_then(|r| r.error()),
        Some(InstrumentError::NotFound)
    );
    assert_eq!(
        snapshot.instrument("GLD").and_then(|r| r.error()),
        Some(InstrumentError::NoData)
    );

    let value = serde_json::to_value(&snapshot).expect("snapshot json");
    assert_eq!(value["NOPE"]["error"], "Data not found");
    assert_eq!(value["GLD"]["error"], "No data available");
}

#[tokio::test]
async fn test_unconfigured_rates_make_no_calls() {
    let rates = Arc::new(MockRates::new(false, false));
    let engine = SnapshotEngine::new(
        Arc::new(MockPrices::with(vec![("SPY", flat(400.0, 5))])),
        rates.clone(),
    );

    let snapshot = engine.get_market_snapshot(Some(vec!["SPY".to_string()])).await;

    assert_eq!(snapshot.rates(), &RatesOutcome::NotConfigured);
    assert_eq!(rates.calls.load(Ordering::SeqCst), 0);
    let value = serde_json::to_value(&snapshot).expect("snapshot json");
    assert_eq!(value["rates"]["info"], "not configured");
}

#[tokio::test]
async fn test_rate_outage_leaves_metrics_intact() {
    let engine = SnapshotEngine::new(
        Arc::new(MockPrices::with(vec![("SPY", flat(400.0, 5))])),
        Arc::new(MockRates::new(true, true)),
    );

    let snapshot = engine.get_market_snapshot(Some(vec!["SPY".to_string()])).await;

    assert!(snapshot.rates_error().is_some());
    assert!(snapshot.market_data_error().is_none());
    assert!(snapshot.instrument("SPY").and_then(|r| r.metrics()).is_some());

    let value = serde_json::to_value(&snapshot).expect("snapshot json");
    assert!(value.get("rates_error").is_some());
    assert!(value.get("rates").is_none());
}

#[tokio::test]
async fn test_identifiers_are_normalized_and_ordered() {
    let prices = Arc::new(MockPrices::with(vec![
        ("QQQ", flat(300.0, 5)),
        ("SPY", flat(400.0, 5)),
    ]));
    let engine = SnapshotEngine::new(prices.clone(), Arc::new(MockRates::new(false, false)));

    let snapshot = engine
        .get_market_snapshot(Some(vec![
            " QQQ ".to_string(),
            "SPY".to_string(),
            "QQQ".to_string(),
            "".to_string(),
            "rates".to_string(),
        ]))
        .await;

    let keys: Vec<&str> = snapshot.instruments().iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(keys, vec!["QQQ", "SPY"]);
    assert_eq!(
        *prices.requested.lock().expect("requested lock"),
        vec!["QQQ".to_string(), "SPY".to_string()]
    );
}

#[tokio::test]
async fn test_rendered_rates_error_hides_credential() {
    let rates = FredClient::new(Some("SECRETKEY123".to_string()), 2)
        .expect("client builds")
        .with_base_url("http://127.0.0.1:9/fred/series/observations");
    let engine = SnapshotEngine::new(
        Arc::new(MockPrices::with(vec![("SPY", flat(400.0, 5))])),
        Arc::new(rates),
    );

    let snapshot = engine.get_market_snapshot(Some(vec!["SPY".to_string()])).await;

    assert!(snapshot.rates_error().is_some());
    let rendered = snapshot.render().expect("snapshot renders");
    assert!(!rendered.contains("SECRETKEY123"));
}
