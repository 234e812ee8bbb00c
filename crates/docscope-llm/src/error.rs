//! Service error types.

use docscope_types::DocscopeError;
use thiserror::Error;

/// Errors raised by the embedding/generation collaborators.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<LlmError> for DocscopeError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::DimensionMismatch { expected, actual } => {
                DocscopeError::DimensionMismatch { expected, actual }
            }
            LlmError::ConfigError(msg) => DocscopeError::Config(msg),
            other => DocscopeError::Service(other.to_string()),
        }
    }
}
