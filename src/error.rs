//! Error types for the smart-proxy-pool crate.

use thiserror::Error;

/// Error returned when no proxy is available in the pool.
#[derive(Debug, Error)]
#[error("No proxy available in pool")]
pub struct NoProxyAvailable;

/// Error returned when a source name is not present in the registry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown proxy source: {0}")]
pub struct UnknownSource(pub String);

/// Failure to retrieve a source page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source refused us (HTTP 403/429 or an anti-bot page).
    #[error("blocked by {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    /// Any other non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether this failure is a rate-limit or block signal from the source.
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }
}

/// Failure while reading or writing the state file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}
