//! Macro rate fetcher backed by FRED
//! Each series is fetched on its own; one bad series never sinks the rest

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use super::{DataError, DataResult};

const FRED_OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// Recent observations requested per series; FRED reports holidays as "."
const OBSERVATION_LOOKBACK: u32 = 10;

/// FRED series code → display name
pub const MACRO_SERIES: [(&str, &str); 4] = [
    ("DGS10", "US 10Y Treasury Yield"),
    ("DGS2", "US 2Y Treasury Yield"),
    ("DFF", "Fed Funds Effective Rate"),
    ("T10Y2Y", "10Y-2Y Treasury Spread"),
];

/// Display name for a series code, if it is in the translation table
pub fn display_name(series_code: &str) -> Option<&'static str> {
    MACRO_SERIES
        .iter()
        .find(|(code, _)| *code == series_code)
        .map(|(_, name)| *name)
}

/// Latest available value of one macro series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateObservation {
    pub series_code: String,
    pub name: String,
    pub value: f64,
}

/// Outcome of a rate fetch for one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum RatesOutcome {
    /// Display name → latest value, for every series that succeeded
    Observed(BTreeMap<String, f64>),
    /// No credential supplied; nothing was fetched
    NotConfigured,
    /// Every series failed, which means the source itself is down
    Unavailable(String),
}

/// Source of latest macro observations
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Whether a credential is present. Unconfigured sources are never called.
    fn is_configured(&self) -> bool;

    async fn latest_observation(&self, series_code: &str) -> DataResult<f64>;
}

/// Fetch every series in the translation table.
///
/// Failed series are logged and dropped. `Unavailable` is only reported when
/// nothing at all came back; if every series answered but none had a usable
/// value, the reason says so instead of blaming the source.
pub async fn fetch_macro_rates(source: &dyn RateSource) -> RatesOutcome {
    if !source.is_configured() {
        tracing::info!("FRED_API_KEY not set, skipping macro rates");
        return RatesOutcome::NotConfigured;
    }

    let fetches = MACRO_SERIES.into_iter().map(|(code, name)| async move {
        let result = source.latest_observation(code).await;
        (code, name, result)
    });

    let mut rates = BTreeMap::new();
    let mut last_error = None;
    let mut only_gaps = true;

    for (code, name, result) in join_all(fetches).await {
        match result {
            Ok(value) => {
                let observation = RateObservation {
                    series_code: code.to_string(),
                    name: name.to_string(),
                    value,
                };
                tracing::debug!(?observation, "Rate observed");
                rates.insert(observation.name, observation.value);
            }
            Err(e) => {
                tracing::warn!(series = code, "Rate series fetch failed: {}", e);
                only_gaps &= matches!(e, DataError::NoData { .. });
                last_error = Some(e.to_string());
            }
        }
    }

    match (rates.is_empty(), last_error) {
        (true, Some(_)) if only_gaps => RatesOutcome::Unavailable(
            "No recent observations for any macro series".to_string(),
        ),
        (true, Some(reason)) => RatesOutcome::Unavailable(reason),
        _ => RatesOutcome::Observed(rates),
    }
}

/// FRED API response structures
#[derive(Debug, Deserialize)]
struct FredObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    #[allow(dead_code)]
    date: String,
    value: String,
}

/// FRED client; a missing API key puts it in the unconfigured state
pub struct FredClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl FredClient {
    pub fn new(api_key: Option<String>, timeout_seconds: u64) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("market-interpreter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: FRED_OBSERVATIONS_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl RateSource for FredClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn latest_observation(&self, series_code: &str) -> DataResult<f64> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DataError::Config("FRED_API_KEY is not set".to_string()))?;

        let limit = OBSERVATION_LOOKBACK.to_string();
        let url = Url::parse_with_params(
            &self.base_url,
            &[
                ("series_id", series_code),
                ("api_key", api_key),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", limit.as_str()),
            ],
        )
        .map_err(|e| DataError::Internal(format!("Invalid FRED URL: {}", e)))?;

        tracing::debug!(
            "FRED request: GET {}",
            url.as_str().replace(api_key, "***")
        );

        // reqwest errors embed the request URL, which carries the key
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Network(e.without_url()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DataError::api_error(
                status_code,
                format!("FRED {}: {}", series_code, error_text),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DataError::Network(e.without_url()))?;
        latest_numeric_value(series_code, &body)
    }
}

/// Newest observation whose value parses as a number
fn latest_numeric_value(series_code: &str, body: &str) -> DataResult<f64> {
    let parsed: FredObservationsResponse = serde_json::from_str(body)?;

    parsed
        .observations
        .iter()
        .find_map(|obs| obs.value.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .ok_or_else(|| DataError::NoData {
            symbol: series_code.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRates {
        configured: bool,
        calls: AtomicUsize,
        failing: Vec<&'static str>,
    }

    impl ScriptedRates {
        fn new(configured: bool, failing: Vec<&'static str>) -> Self {
            Self {
                configured,
                calls: AtomicUsize::new(0),
                failing,
            }
        }
    }

    #[async_trait]
    impl RateSource for ScriptedRates {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn latest_observation(&self, series_code: &str) -> DataResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&series_code) {
                Err(DataError::api_error(400, format!("bad series {}", series_code)))
            } else {
                Ok(4.25)
            }
        }
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_never_called() {
        let source = ScriptedRates::new(false, vec![]);
        let outcome = fetch_macro_rates(&source).await;
        assert_eq!(outcome, RatesOutcome::NotConfigured);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_series_is_omitted() {
        let source = ScriptedRates::new(true, vec!["DGS2"]);
        match fetch_macro_rates(&source).await {
            RatesOutcome::Observed(rates) => {
                assert_eq!(rates.len(), MACRO_SERIES.len() - 1);
                assert!(!rates.contains_key("US 2Y Treasury Yield"));
                assert_eq!(rates["US 10Y Treasury Yield"], 4.25);
            }
            other => panic!("expected observed rates, got {:?}", other),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), MACRO_SERIES.len());
    }

    #[tokio::test]
    async fn test_all_series_failing_marks_source_unavailable() {
        let source = ScriptedRates::new(true, MACRO_SERIES.iter().map(|(c, _)| *c).collect());
        match fetch_macro_rates(&source).await {
            RatesOutcome::Unavailable(reason) => assert!(reason.contains("bad series")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_series_empty_is_reported_as_data_gap() {
        struct EmptySeries;

        #[async_trait]
        impl RateSource for EmptySeries {
            fn is_configured(&self) -> bool {
                true
            }

            async fn latest_observation(&self, series_code: &str) -> DataResult<f64> {
                Err(DataError::NoData {
                    symbol: series_code.to_string(),
                })
            }
        }

        match fetch_macro_rates(&EmptySeries).await {
            RatesOutcome::Unavailable(reason) => {
                assert_eq!(reason, "No recent observations for any macro series")
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_source_does_not_leak_key() {
        // Nothing listens on the discard port, so every request fails to connect
        let client = FredClient::new(Some("SECRETKEY123".to_string()), 2)
            .unwrap()
            .with_base_url("http://127.0.0.1:9/fred/series/observations");

        let err = client.latest_observation("DGS10").await.unwrap_err();
        assert!(matches!(err, DataError::Network(_)));
        assert!(!err.to_string().contains("SECRETKEY123"));

        match fetch_macro_rates(&client).await {
            RatesOutcome::Unavailable(reason) => assert!(!reason.contains("SECRETKEY123")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_latest_numeric_value_skips_missing_marker() {
        let body = r#"{"observations": [
            {"date": "2024-07-04", "value": "."},
            {"date": "2024-07-03", "value": "4.36"},
            {"date": "2024-07-02", "value": "4.43"}
        ]}"#;
        assert_eq!(latest_numeric_value("DGS10", body).unwrap(), 4.36);
    }

    #[test]
    fn test_latest_numeric_value_without_numbers() {
        let body = r#"{"observations": [{"date": "2024-07-04", "value": "."}]}"#;
        let err = latest_numeric_value("DGS10", body).unwrap_err();
        assert!(matches!(err, DataError::NoData { .. }));
    }

    #[test]
    fn test_blank_key_counts_as_unconfigured() {
        let client = FredClient::new(Some("  ".to_string()), 5).unwrap();
        assert!(!client.is_configured());
        assert_eq!(display_name("DGS10"), Some("US 10Y Treasury Yield"));
        assert_eq!(display_name("UNKNOWN"), None);
    }
}
