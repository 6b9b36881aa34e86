//! Error types for Top News.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Mail source error: {0}")]
    Source(#[from] SourceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Model service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} unreachable: {reason}")]
    Connection { provider: String, reason: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl LlmError {
    /// Network-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }
}

/// Mail source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Mail directory {path} unreadable: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline run errors. Per-item failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("A pipeline run is already in progress")]
    Busy,

    #[error("Pipeline run cancelled")]
    Cancelled,

    #[error("Persistence failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail fetch failed: {0}")]
    Source(#[from] SourceError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_connection_errors_are_transient() {
        let timeout = LlmError::Timeout {
            provider: "ollama".into(),
            timeout: Duration::from_secs(300),
        };
        let conn = LlmError::Connection {
            provider: "ollama".into(),
            reason: "refused".into(),
        };
        assert!(timeout.is_transient());
        assert!(conn.is_transient());
    }

    #[test]
    fn http_failures_are_not_transient() {
        let err = LlmError::RequestFailed {
            provider: "ollama".into(),
            reason: "HTTP 500".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn pipeline_error_wraps_database_error() {
        let err: PipelineError = DatabaseError::Query("insert_story: disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
