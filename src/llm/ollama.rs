//! Ollama-compatible `/api/generate` client over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{GenerateRequest, ModelService};

const PROVIDER: &str = "ollama";

/// Configuration for the Ollama service.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Full generate endpoint, e.g. `http://localhost:11434/api/generate`.
    pub url: String,
    pub model: String,
    /// Bearer token for hosted or proxied servers.
    pub api_key: Option<SecretString>,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

/// JSON body sent to the generate endpoint.
#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

/// Blocking-free Ollama client. Returns the raw response body.
pub struct OllamaService {
    http: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaService {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        tracing::info!(url = %config.url, model = %config.model, "Using Ollama");
        Ok(Self { http, config })
    }

    fn map_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                provider: PROVIDER.to_string(),
                timeout: self.config.timeout,
            }
        } else if e.is_connect() {
            LlmError::Connection {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            }
        } else {
            LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ModelService for OllamaService {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let payload = GeneratePayload {
            model: &self.config.model,
            prompt: &request.prompt,
            stream: false,
            format: request.structured.then_some("json"),
        };

        let mut builder = self.http.post(&self.config.url).json(&payload);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                self.map_error(e)
            } else {
                LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        debug!(bytes = body.len(), structured = request.structured, "Model response received");
        Ok(body)
    }
}
