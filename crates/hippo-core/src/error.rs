//! Error types for hippo-core.

use thiserror::Error;

/// Result type alias using hippo-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for consolidation operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input. Rejected, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Connection or lock trouble. The caller retries with backoff.
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    /// An invariant would break (e.g. promoting a record that vanished).
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy)
            | Some(ErrorCode::DatabaseLocked)
            | Some(ErrorCode::CannotOpen)
            | Some(ErrorCode::SystemIoFailure) => Self::TransientStorage(err.to_string()),
            _ => Self::Storage(err),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a consistency violation
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::ConsistencyViolation(message.into())
    }

    /// Create a transient storage error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientStorage(message.into())
    }

    /// Whether the caller should retry this operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_) | Self::Timeout { .. })
    }

    /// Whether the failure concerns a single record and the batch may continue
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::ConsistencyViolation(_) | Self::Validation(_))
    }
}
