//! Generative model integration.
//!
//! - `provider`: the [`ModelService`] seam (one call, raw body out)
//! - `ollama`: HTTP implementation for Ollama-compatible servers
//! - `client`: [`ModelClient`], adding timeout, retry, and interpretation
//! - `extract`: JSON recovery from noisy model output

pub mod client;
pub mod extract;
pub mod ollama;
pub mod provider;
pub mod retry;

pub use client::{DEFAULT_TIMEOUT, ModelClient, ModelFailure, ModelOutput};
pub use ollama::{OllamaConfig, OllamaService};
pub use provider::{GenerateRequest, ModelService};
pub use retry::RetryPolicy;

use std::sync::Arc;

use crate::error::LlmError;

/// Build a model client backed by Ollama.
pub fn create_client(config: OllamaConfig, retry: RetryPolicy) -> Result<ModelClient, LlmError> {
    let timeout = config.timeout;
    let service: Arc<dyn ModelService> = Arc::new(OllamaService::new(config)?);
    Ok(ModelClient::new(service, retry, timeout))
}
