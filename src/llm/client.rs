//! Model client: retrying, timeout-bounded calls with structured extraction.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::LlmError;
use crate::llm::extract;
use crate::llm::provider::{GenerateRequest, ModelService};
use crate::llm::retry::RetryPolicy;

/// Default per-attempt timeout. Local generation is slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Why a model call produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFailure {
    /// Attempts made, including the first.
    pub attempts: u32,
    pub reason: String,
}

/// Interpreted model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A JSON value recovered from the response.
    Structured(Value),
    /// Non-JSON text, trimmed.
    PlainText(String),
    /// The call failed after all permitted attempts.
    Failed(ModelFailure),
}

impl ModelOutput {
    /// Text form of the output. Structured values are re-serialized.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::PlainText(text) => Some(text),
            Self::Structured(Value::String(text)) => Some(text),
            Self::Structured(value) => Some(value.to_string()),
            Self::Failed(_) => None,
        }
    }

    pub fn into_structured(self) -> Option<Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::PlainText(_) | Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Wraps a [`ModelService`] with timeout, retry, and output interpretation.
///
/// Never returns an error: every failure path ends in [`ModelOutput::Failed`]
/// or a best-effort [`ModelOutput::PlainText`].
pub struct ModelClient {
    service: Arc<dyn ModelService>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(service: Arc<dyn ModelService>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            service,
            retry,
            timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    /// Generate with the configured retry count.
    pub async fn generate(&self, prompt: &str, structured: bool) -> ModelOutput {
        self.generate_with_retries(prompt, structured, self.retry.retries)
            .await
    }

    /// Generate, retrying transient failures up to `retries` extra times.
    pub async fn generate_with_retries(
        &self,
        prompt: &str,
        structured: bool,
        retries: u32,
    ) -> ModelOutput {
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            structured,
        };
        let policy = RetryPolicy {
            retries,
            ..self.retry
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&request).await {
                Ok(body) => {
                    debug!(attempt, structured, "Model call succeeded");
                    return extract::interpret(&body, structured);
                }
                Err(e) if e.is_transient() && attempt < policy.max_attempts() => {
                    warn!(
                        model = self.model_name(),
                        attempt,
                        retries,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    let delay = policy.delay_for(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    error!(
                        model = self.model_name(),
                        attempts = attempt,
                        error = %e,
                        "Model call failed"
                    );
                    return ModelOutput::Failed(ModelFailure {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn attempt(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.service.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: self.model_name().to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
