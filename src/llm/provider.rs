//! Model service abstraction.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Ask the server to constrain output to JSON.
    pub structured: bool,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            structured: false,
        }
    }

    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            structured: true,
        }
    }
}

/// A text-completion endpoint.
///
/// Implementations return the raw response body; interpreting it is the
/// caller's job. Connection failures and timeouts must map to the transient
/// `LlmError` variants so callers can retry them.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Issue one generation call.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;
}
