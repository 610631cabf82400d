//! Error types for the tiered storage engine.
//!
//! Errors are grouped by origin: backend I/O, payload codec, and configuration.
//! "Not found" is never an error here; lookups return `Option` so a miss can fall
//! through to the next tier.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::types::Tier;

/// The primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Compression and decompression errors
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tier required by the operation was disabled at construction.
    #[error("{tier} tier is disabled")]
    TierDisabled { tier: Tier },

    /// Every tier probed by the operation failed or was disabled.
    #[error("all tiers unavailable for {operation}")]
    AllTiersUnavailable { operation: &'static str },
}

/// Errors originating from a tier backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The backend call did not complete in time.
    #[error("{backend_name} call timed out after {timeout_ms}ms")]
    Timeout {
        backend_name: String,
        timeout_ms: u64,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl BackendError {
    /// Returns true if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable { .. }
                | BackendError::ConnectionFailed { .. }
                | BackendError::Timeout { .. }
        )
    }
}

/// Errors raised by the payload codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The encoder failed while compressing.
    #[error("compression failed: {message}")]
    Compression { message: String },

    /// The stored bytes are not a valid compressed stream.
    #[error("corrupt payload: {message}")]
    CorruptPayload { message: String },
}

/// Errors in engine or backend configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid configuration for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    /// No tier could be enabled.
    #[error("no storage tier is enabled")]
    NoTiersEnabled,
}

impl StorageError {
    /// Returns true if this error is a transient failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Backend(e) => e.is_transient(),
            StorageError::AllTiersUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Returns true if the stored payload could not be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Codec(CodecError::CorruptPayload { .. }))
    }
}

/// Result type for engine operations.
pub type StorageResult<T> = Result<T, StorageError>;

pub(crate) fn internal_error(backend_name: &str, message: impl Into<String>) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: backend_name.to_string(),
        message: message.into(),
        source: None,
    })
}

pub(crate) fn serialization_error(message: impl Into<String>) -> StorageError {
    StorageError::Backend(BackendError::SerializationError {
        message: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = BackendError::Timeout {
            backend_name: "sqlite".to_string(),
            timeout_ms: 500,
        };
        assert!(timeout.is_transient());

        let query = BackendError::QueryError {
            message: "syntax".to_string(),
        };
        assert!(!query.is_transient());
    }

    #[test]
    fn test_retryable_and_corrupt() {
        let err = StorageError::Backend(BackendError::Unavailable {
            backend_name: "s3".to_string(),
            message: "connection refused".to_string(),
        });
        assert!(err.is_retryable());
        assert!(!err.is_corrupt());

        let err = StorageError::Codec(CodecError::CorruptPayload {
            message: "bad header".to_string(),
        });
        assert!(err.is_corrupt());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::TierDisabled { tier: Tier::Hot };
        assert_eq!(err.to_string(), "hot tier is disabled");

        let err = StorageError::Backend(BackendError::Timeout {
            backend_name: "postgres".to_string(),
            timeout_ms: 250,
        });
        assert_eq!(err.to_string(), "postgres call timed out after 250ms");
    }
}
