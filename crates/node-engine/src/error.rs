//! Error types for the node engine

use inference::ProviderError;
use thiserror::Error;

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur while executing a node
#[derive(Debug, Error)]
pub enum NodeEngineError {
    /// Missing or invalid input, with user-facing remediation text
    #[error("{0}")]
    Validation(String),

    /// Node parameters could not be interpreted
    #[error("Invalid parameters on node '{node_id}': {message}")]
    InvalidParams { node_id: String, message: String },

    /// Error reported by the inference provider, passed through unmodified
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Another run holds the engine
    #[error("Execution already in progress")]
    AlreadyRunning,

    /// Execution was aborted by the caller
    #[error("Execution cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Task execution failed
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),
}

impl NodeEngineError {
    /// Create a validation error with a message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether this error came from a caller-requested abort
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Provider(ProviderError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = NodeEngineError::validation("Connect an Image node first.");
        assert_eq!(err.to_string(), "Connect an Image node first.");
    }

    #[test]
    fn test_provider_error_passes_through() {
        let err: NodeEngineError = ProviderError::Backend("CUDA out of memory".to_string()).into();
        assert_eq!(err.to_string(), "CUDA out of memory");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(NodeEngineError::Cancelled.is_cancelled());
        assert!(NodeEngineError::from(ProviderError::Cancelled).is_cancelled());
    }
}
