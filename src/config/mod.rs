use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

use crate::data::{Lookback, DEFAULT_SYMBOLS};
use crate::orchestrator::StageKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub apis: ApiConfig,
    pub llm: LlmConfig,
    pub market: MarketConfig,
    pub stages: StageModels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Absent key is a valid state: rates are reported as not configured
    pub fred_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub primary_model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub default_symbols: Vec<String>,
    pub lookback: Lookback,
    pub http_timeout_seconds: u64,
}

/// Generation parameters for one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    pub model: String,
    pub temperature: Option<f32>,
}

/// Stage → generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageModels(BTreeMap<StageKind, StageParams>);

impl StageModels {
    /// Every stage on the same model
    pub fn uniform(model: &str) -> Self {
        Self(
            StageKind::ALL
                .iter()
                .map(|kind| {
                    (
                        *kind,
                        StageParams {
                            model: model.to_string(),
                            temperature: None,
                        },
                    )
                })
                .collect(),
        )
    }

    pub fn get(&self, kind: StageKind) -> Option<&StageParams> {
        self.0.get(&kind)
    }

    pub fn set(&mut self, kind: StageKind, params: StageParams) {
        self.0.insert(kind, params);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StageKind, &StageParams)> {
        self.0.iter()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let primary_model =
            env::var("PRIMARY_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string());

        let mut stages = StageModels::uniform(&primary_model);
        for kind in StageKind::ALL {
            let prefix = kind.env_prefix();
            let model = env::var(format!("{}_MODEL", prefix))
                .unwrap_or_else(|_| primary_model.clone());
            let temperature = match env::var(format!("{}_TEMPERATURE", prefix)) {
                Ok(raw) => Some(
                    raw.parse::<f32>()
                        .with_context(|| format!("Invalid {}_TEMPERATURE value", prefix))?,
                ),
                Err(_) => None,
            };
            stages.set(kind, StageParams { model, temperature });
        }

        let default_symbols = match env::var("MARKET_SYMBOLS") {
            Ok(raw) => parse_symbol_list(&raw),
            Err(_) => default_basket(),
        };

        let config = Config {
            apis: ApiConfig {
                fred_api_key: env::var("FRED_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            },
            llm: LlmConfig {
                ollama_url: env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                primary_model,
                timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("Invalid LLM_TIMEOUT_SECONDS value")?,
                max_retries: env::var("LLM_MAX_RETRIES")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .context("Invalid LLM_MAX_RETRIES value")?,
            },
            market: MarketConfig {
                default_symbols: if default_symbols.is_empty() {
                    default_basket()
                } else {
                    default_symbols
                },
                lookback: env::var("MARKET_LOOKBACK")
                    .unwrap_or_else(|_| "3mo".to_string())
                    .parse()
                    .context("Invalid MARKET_LOOKBACK value")?,
                http_timeout_seconds: env::var("MARKET_HTTP_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid MARKET_HTTP_TIMEOUT_SECONDS value")?,
            },
            stages,
        };

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apis: ApiConfig { fred_api_key: None },
            llm: LlmConfig {
                ollama_url: "http://localhost:11434".to_string(),
                primary_model: "llama3.2:3b".to_string(),
                timeout_seconds: 120,
                max_retries: 1,
            },
            market: MarketConfig {
                default_symbols: default_basket(),
                lookback: Lookback::ThreeMonths,
                http_timeout_seconds: 30,
            },
            stages: StageModels::uniform("llama3.2:3b"),
        }
    }
}

fn default_basket() -> Vec<String> {
    DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

/// Comma-separated symbols, trimmed, blanks dropped
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
