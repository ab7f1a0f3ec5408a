//! Error taxonomy for indexer operations.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by indexer operations
#[derive(Debug, Error)]
pub enum IndexerError {
    /// No HTTP response was obtained
    #[error("Transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success response without a backoff hint
    #[error("Remote operation failed at {endpoint} ({status}): {reason} - Details: {body}")]
    RemoteOperation {
        endpoint: String,
        status: StatusCode,
        reason: String,
        body: String,
    },

    /// Non-success response carrying a Retry-After hint
    #[error("Rate limited at {endpoint} ({status}), retry after {retry_after:?}: {reason} - Details: {body}")]
    RateLimited {
        endpoint: String,
        status: StatusCode,
        reason: String,
        body: String,
        retry_after: Duration,
    },

    /// Successful response whose body did not match the expected shape
    #[error("Unexpected response shape from {endpoint}: {message}")]
    Schema { endpoint: String, message: String },

    /// Pre-flight constraint violation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Archive writer or output sink failure
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl IndexerError {
    /// Server-suggested wait before retrying, if one was given
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            IndexerError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry later
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexerError::RateLimited { .. })
    }

    /// HTTP status of a remote failure
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            IndexerError::RemoteOperation { status, .. }
            | IndexerError::RateLimited { status, .. } => Some(*status),
            IndexerError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl From<zip::result::ZipError> for IndexerError {
    fn from(e: zip::result::ZipError) -> Self {
        IndexerError::Archive(e.to_string())
    }
}

pub type Result<T, E = IndexerError> = std::result::Result<T, E>;
