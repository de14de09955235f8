//! Error types for panelkb.
//!
//! A single error enum covers every failure class of the retrieval engine.
//! The variants follow how the failure must be handled: configuration errors
//! stop the process, query errors go back to the caller, and the rest describe
//! where a storage or embedding operation went wrong.

use thiserror::Error;

/// Unified error type for panelkb.
///
/// All library functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Fatal configuration errors (dimension mismatch, empty knowledge base, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid query input (bad `k`, blank query, malformed verdict)
    #[error("Query error: {0}")]
    Query(String),

    /// Embedding provider failures
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index storage and search failures
    #[error("Index error: {0}")]
    Index(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error must prevent the process from serving requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
