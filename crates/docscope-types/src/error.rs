//! Error types for docscope.

use thiserror::Error;

use crate::ids::LevelKey;

/// Convenience alias used across the workspace.
pub type Result<T, E = DocscopeError> = std::result::Result<T, E>;

/// Fatal errors raised by index, topic and probe operations.
///
/// Non-fatal conditions (a probe scored against a different index, a probe
/// with low cross-validated accuracy) are never errors; they are logged and
/// reported alongside the successful result.
#[derive(Debug, Error)]
pub enum DocscopeError {
    /// Negative/zero counts, empty document sets, malformed tables
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested topic is absent from the assignment vector
    #[error("Topic {topic} is not present in the assignment for level {level}")]
    InvalidTopicIndex { level: LevelKey, topic: usize },

    /// Requested level key has not been built on the index
    #[error("Unknown topic level: {0}")]
    UnknownLevel(LevelKey),

    /// A generation step was requested without a template to render
    #[error("No template configured for '{0}'")]
    MissingTemplate(String),

    /// Vector/matrix dimensions do not line up
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Scoring or cross-validating a probe that has no coefficients yet
    #[error("Probe is not trained: {0}")]
    NotTrained(String),

    /// Embedding or generation service failure (fatal for the whole batch)
    #[error("External service error: {0}")]
    Service(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error while persisting or loading state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocscopeError {
    /// Shorthand for [`DocscopeError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DocscopeError::InvalidTopicIndex {
            level: LevelKey::Count(4),
            topic: 7,
        };
        assert_eq!(
            err.to_string(),
            "Topic 7 is not present in the assignment for level 4"
        );

        let err = DocscopeError::UnknownLevel(LevelKey::Name("sentiment".into()));
        assert_eq!(err.to_string(), "Unknown topic level: sentiment");

        let err = DocscopeError::invalid("k must be positive");
        assert!(matches!(err, DocscopeError::InvalidArgument(_)));
    }

    #[test]
    fn test_from_serde_error() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: DocscopeError = parse.unwrap_err().into();
        assert!(matches!(err, DocscopeError::Serialization(_)));
    }
}
