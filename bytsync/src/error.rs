//! Error types for the sync engine

use bytstore::StoreError;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that abort a sync cycle
///
/// A failed cycle leaves the local state untouched; the next interval
/// retries from scratch.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with an unexpected status
    #[error("Upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Upstream did not answer in time
    #[error("Fetch timed out after {0} ms")]
    FetchTimeout(u64),

    /// Upstream could not produce its content
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Pulled content was rejected or could not be written locally
    #[error("Apply failed: {0}")]
    Apply(#[source] StoreError),
}

impl SyncError {
    /// True for errors raised before anything was applied locally
    pub fn is_fetch(&self) -> bool {
        !matches!(self, SyncError::Apply(_))
    }
}
