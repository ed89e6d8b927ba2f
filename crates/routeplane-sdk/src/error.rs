//! Error types for processors

use thiserror::Error;

/// Errors that can occur while a processor handles an exchange
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Missing header: {0}")]
    MissingHeader(String),

    #[error("Unsupported body: expected {expected}, found {found}")]
    UnsupportedBody {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Processing failed: {0}")]
    Failed(String),
}

impl ProcessError {
    /// Build a generic failure from any displayable error.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        ProcessError::Failed(err.to_string())
    }
}
