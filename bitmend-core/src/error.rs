//! Error types for bitmend
//!
//! Provides a unified error type for all segmentation, chunking, corruption
//! and reconstruction operations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for bitmend operations
pub type Result<T> = std::result::Result<T, BitmendError>;

/// Unified error type for bitmend
#[derive(Error, Debug)]
pub enum BitmendError {
    // ===== Structure Errors =====
    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },

    // ===== Chunk Errors =====
    #[error("Chunk count mismatch: expected {expected}, got {actual}")]
    ChunkCountMismatch { expected: u32, actual: u32 },

    #[error("Missing chunk: index {index}")]
    MissingChunk { index: u32 },

    #[error("Chunk length mismatch at index {index}: expected {expected}, got {actual}")]
    ChunkLengthMismatch {
        index: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid chunk size: {0} (must be > 0)")]
    InvalidChunkSize(u32),

    // ===== Corruption Errors =====
    #[error("Bit-flip collaborator failed on {chunk}: {reason}")]
    CollaboratorFailure { chunk: String, reason: String },

    #[error("Bit-flip collaborator timed out on {chunk} after {timeout:?}")]
    CollaboratorTimeout { chunk: String, timeout: Duration },

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BitmendError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        BitmendError::MalformedInput {
            reason: reason.into(),
        }
    }

    /// Whether a caller may retry the failed operation.
    ///
    /// Only collaborator failures qualify; the core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BitmendError::CollaboratorFailure { .. } | BitmendError::CollaboratorTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for BitmendError {
    fn from(err: serde_json::Error) -> Self {
        BitmendError::Serialization(err.to_string())
    }
}

impl From<tempfile::PersistError> for BitmendError {
    fn from(err: tempfile::PersistError) -> Self {
        BitmendError::Io(err.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BitmendError::ChunkCountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Chunk count mismatch: expected 3, got 2");

        let err = BitmendError::MissingChunk { index: 7 };
        assert_eq!(err.to_string(), "Missing chunk: index 7");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BitmendError = io_err.into();
        assert!(matches!(err, BitmendError::Io(_)));
    }

    #[test]
    fn test_retryable() {
        let err = BitmendError::CollaboratorFailure {
            chunk: "image_0001_chunk_0000".to_string(),
            reason: "exit status 1".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!BitmendError::MissingChunk { index: 0 }.is_retryable());
        assert!(!BitmendError::malformed("no SOS").is_retryable());
    }
}
