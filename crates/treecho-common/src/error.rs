//! Error types for Treecho
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using TreechoError
pub type Result<T> = std::result::Result<T, TreechoError>;

/// Unified error type for Treecho operations
#[derive(Debug, Error)]
pub enum TreechoError {
    // Delegated action execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    // Session lookup errors
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the external action executor
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("Action rejected by environment: {0}")]
    Rejected(String),

    #[error("Environment unavailable: {0}")]
    Unavailable(String),

    #[error("Action timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Safety check not acknowledged: {0}")]
    SafetyCheck(String),
}

impl From<serde_json::Error> for TreechoError {
    fn from(err: serde_json::Error) -> Self {
        TreechoError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TreechoError {
    fn from(err: std::io::Error) -> Self {
        TreechoError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for TreechoError {
    fn from(err: anyhow::Error) -> Self {
        TreechoError::Internal(err.to_string())
    }
}
