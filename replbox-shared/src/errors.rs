//! Error types used across the Replbox runtime.

use std::time::Duration;
use thiserror::Error;

/// Result type for Replbox operations.
pub type ReplboxResult<T> = Result<T, ReplboxError>;

#[derive(Debug, Error)]
pub enum ReplboxError {
    #[error("box not found: {0}")]
    NotFound(String),

    #[error("box {0} is not running")]
    NotRunning(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("pipe to child broken: {0}")]
    PipeBroken(String),

    #[error("package install failed: {0}")]
    InstallFailed(String),

    #[error("snapshot failed: {0}")]
    SnapshotFailed(String),

    #[error("restore failed: {0}")]
    RestoreFailed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for ReplboxError {
    fn from(err: std::io::Error) -> Self {
        ReplboxError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for ReplboxError {
    fn from(err: serde_json::Error) -> Self {
        ReplboxError::Internal(format!("JSON error: {}", err))
    }
}

impl From<String> for ReplboxError {
    fn from(err: String) -> Self {
        ReplboxError::Internal(err)
    }
}

impl From<&str> for ReplboxError {
    fn from(err: &str) -> Self {
        ReplboxError::Internal(err.to_string())
    }
}
