//! Error types for the sync layer.

use postsync_storage::StorageError;
use postsync_types::{EntityKind, RecordId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store is not ready or lost its connection. Retry later.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other local store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network or API failure. Carries no retry hint beyond "try later".
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The entity exists neither remotely nor locally.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: RecordId },

    /// Offline pagination ran past the cached records.
    #[error("no offline data for {page_size} records from offset {start}")]
    NoOfflineData { start: usize, page_size: usize },

    /// The caller handed over a record the operation cannot accept.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns true for failures a later attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::RemoteUnavailable(_))
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        if err.is_unavailable() {
            Self::StorageUnavailable(err.to_string())
        } else {
            Self::Storage(err.to_string())
        }
    }
}

impl From<postsync_types::Error> for SyncError {
    fn from(err: postsync_types::Error) -> Self {
        match err {
            postsync_types::Error::Serialization(e) => Self::Serialization(e),
            other => Self::InvalidRecord(other.to_string()),
        }
    }
}
