//! LLM integration module for Ollama
//! Provides the text-generation seam the pipeline stages plug into

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest as OllamaRequest, options::GenerationOptions},
    Ollama,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use url::Url;

/// LLM response with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
}

/// One stage invocation: role instructions plus the text to work on
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub temperature: Option<f32>,
    pub instructions: String,
    pub input: String,
}

/// Opaque text-generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<LLMResponse>;
}

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub ollama_url: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            timeout_seconds: 120,
            max_retries: 1,
        }
    }
}

/// LLM client with local Ollama integration
#[derive(Debug, Clone)]
pub struct LLMClient {
    ollama: Ollama,
    config: LLMConfig,
}

impl LLMClient {
    /// Create new LLM client; does not touch the network
    pub fn new(config: LLMConfig) -> Result<Self> {
        let parsed_url = Url::parse(&config.ollama_url).context("Invalid Ollama URL")?;

        let host = parsed_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("No host in Ollama URL"))?;
        let port = parsed_url.port().unwrap_or(11434);

        let ollama = Ollama::new(format!("{}://{}", parsed_url.scheme(), host), port);

        Ok(Self { ollama, config })
    }

    /// Create client from config::Config
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Self::new(LLMConfig {
            ollama_url: config.llm.ollama_url.clone(),
            timeout_seconds: config.llm.timeout_seconds,
            max_retries: config.llm.max_retries.max(1),
        })
    }

    /// Verify Ollama is reachable and report which of `models` are missing
    pub async fn health_check(&self, models: &[String]) -> Result<Vec<String>> {
        info!("Testing Ollama connectivity at {}", self.config.ollama_url);

        let available = match timeout(Duration::from_secs(10), self.ollama.list_local_models()).await {
            Ok(Ok(models)) => models.into_iter().map(|m| m.name).collect::<Vec<_>>(),
            Ok(Err(e)) => {
                error!("Failed to list Ollama models: {}", e);
                return Err(anyhow::anyhow!(
                    "Ollama API error when listing models: {}. Is Ollama running?",
                    e
                ));
            }
            Err(_) => {
                error!("Timeout connecting to Ollama at {}", self.config.ollama_url);
                return Err(anyhow::anyhow!(
                    "Timeout connecting to Ollama. Is Ollama running at {}?",
                    self.config.ollama_url
                ));
            }
        };

        let missing: Vec<String> = models
            .iter()
            .filter(|wanted| !available.iter().any(|name| name.contains(wanted.as_str())))
            .cloned()
            .collect();

        for model in &missing {
            warn!(
                "Model '{}' not found locally. Consider pulling it with: ollama pull {}",
                model, model
            );
        }

        Ok(missing)
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate(&self, request: GenerationRequest) -> Result<LLMResponse> {
        info!(
            "Generating text with model '{}' (input length: {} chars)",
            request.model,
            request.input.len()
        );

        let mut ollama_request = OllamaRequest::new(request.model.clone(), request.input.clone())
            .system(request.instructions.clone());
        if let Some(temperature) = request.temperature {
            ollama_request =
                ollama_request.options(GenerationOptions::default().temperature(temperature));
        }

        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            match timeout(
                Duration::from_secs(self.config.timeout_seconds),
                self.ollama.generate(ollama_request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    info!(
                        "Generated {} chars with model '{}'",
                        response.response.len(),
                        request.model
                    );

                    return Ok(LLMResponse {
                        content: response.response,
                        model: request.model,
                    });
                }
                Ok(Err(e)) => {
                    error!("Ollama API error on attempt {}: {}", attempt, e);
                    last_error = Some(anyhow::anyhow!("Ollama API error: {}", e));
                }
                Err(_) => {
                    error!(
                        "Timeout on attempt {} after {} seconds",
                        attempt, self.config.timeout_seconds
                    );
                    last_error = Some(anyhow::anyhow!(
                        "Request timeout after {} seconds",
                        self.config.timeout_seconds
                    ));
                }
            }

            if attempt < self.config.max_retries {
                let backoff_seconds = 2_u64.pow(attempt - 1);
                warn!(
                    "Retrying in {} seconds (attempt {}/{})",
                    backoff_seconds, attempt, self.config.max_retries
                );
                tokio::time::sleep(Duration::from_secs(backoff_seconds)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!(
                "Failed to generate text after {} attempts",
                self.config.max_retries
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_bad_url() {
        let config = LLMConfig {
            ollama_url: "not a url".to_string(),
            ..LLMConfig::default()
        };
        assert!(LLMClient::new(config).is_err());
    }

    #[test]
    fn test_client_from_default_config() {
        let config = crate::config::Config::default();
        assert!(LLMClient::from_config(&config).is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires running Ollama
    async fn test_ollama_integration() {
        let client = LLMClient::new(LLMConfig::default()).unwrap();
        let response = client
            .generate(GenerationRequest {
                model: "llama3.2:3b".to_string(),
                temperature: None,
                instructions: "Answer in one word.".to_string(),
                input: "Say hello".to_string(),
            })
            .await;

        match response {
            Ok(resp) => assert!(!resp.content.is_empty()),
            Err(e) => println!("Generation failed (is Ollama running?): {}", e),
        }
    }
}
