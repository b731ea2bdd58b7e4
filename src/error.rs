//! Error types for Quarry.
//!
//! All fallible operations in the crate return [`Result`], whose error type is
//! [`QuarryError`]. Validation errors are raised before any mutation takes
//! place, so a returned error never leaves a store or an index half-updated.

use thiserror::Error;

/// The main error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// I/O errors raised by a storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A referenced library, document or chunk does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An embedding does not have the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The requested distance metric is not supported.
    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(String),

    /// The requested index type is not known.
    #[error("Unknown index type: {0}")]
    UnknownIndexType(String),

    /// The external embedding provider failed. Callers may retry.
    #[error("Embedding provider failure: {0}")]
    EmbeddingProvider(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage backend errors (missing or corrupted files, ...).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index-related errors.
    #[error("Index error: {0}")]
    Index(String),

    /// Internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for operations that may fail with [`QuarryError`].
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        QuarryError::NotFound(msg.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        QuarryError::DimensionMismatch { expected, actual }
    }

    /// Create a new embedding provider error.
    pub fn embedding_provider<S: Into<String>>(msg: S) -> Self {
        QuarryError::EmbeddingProvider(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        QuarryError::InvalidArgument(msg.into())
    }

    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        QuarryError::InvalidConfig(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        QuarryError::Storage(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        QuarryError::Index(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        QuarryError::Internal(msg.into())
    }

    /// Whether the failed operation may succeed if the caller retries it.
    ///
    /// Only embedding provider failures are transient; every other error is a
    /// property of the request or of the stored state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuarryError::EmbeddingProvider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuarryError::dimension_mismatch(1024, 1023);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: expected 1024, got 1023"
        );

        let err = QuarryError::not_found("library 42");
        assert_eq!(err.to_string(), "Not found: library 42");
    }

    #[test]
    fn test_only_provider_failures_are_retryable() {
        assert!(QuarryError::embedding_provider("timeout").is_retryable());
        assert!(!QuarryError::not_found("chunk").is_retryable());
        assert!(!QuarryError::UnknownIndexType("hnsw".into()).is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: QuarryError = io.into();
        assert!(matches!(err, QuarryError::Io(_)));
    }
}
