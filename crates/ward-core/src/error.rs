//! Error types for the ward letter service

use thiserror::Error;
use ward_types::LetterStatus;

/// Main error type for all ward operations
#[derive(Error, Debug)]
pub enum WardError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid state transition: cannot {action} a request that is {from}")]
    InvalidStateTransition {
        action: &'static str,
        from: LetterStatus,
    },

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Dependency unavailable: {0}")]
    DependencyFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Document generation failed: {0}")]
    Document(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Counter cache error: {0}")]
    Cache(#[from] redis::RedisError),
}

impl From<config::ConfigError> for WardError {
    fn from(e: config::ConfigError) -> Self {
        WardError::Config(e.to_string())
    }
}

impl From<lopdf::Error> for WardError {
    fn from(e: lopdf::Error) -> Self {
        WardError::Document(e.to_string())
    }
}

impl WardError {
    /// Errors caused by an unreachable collaborator rather than by the caller
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            WardError::DependencyFailure(_) | WardError::Cache(_) | WardError::Http(_)
        )
    }
}

/// Result type for ward operations
pub type Result<T> = std::result::Result<T, WardError>;
