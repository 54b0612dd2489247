//! Core type definitions for postsync.
//!
//! This crate defines the types shared by the store, the sync engine and the
//! presentation layer:
//! - The three synced entity kinds (posts, comments, users)
//! - Sync metadata carried by every locally persisted record
//! - The `Record` trait that makes the sync logic generic over entity kinds
//! - Queued sync operations
//! - Enriched views handed to the presentation layer

mod enriched;
mod entities;
mod ids;
mod operation;
mod record;

pub use enriched::{EnhancedPost, PostDetails, UNKNOWN_AUTHOR};
pub use entities::{Address, Comment, Company, Geo, Post, User};
pub use ids::{is_provisional, is_remote, RecordId};
pub use operation::{OperationKind, QueuedOperation, SyncOperation};
pub use record::{Collection, EntityKind, Record, SyncMeta, SyncStatus, SYNC_META_FIELDS};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown {what}: {value}")]
    Unknown { what: &'static str, value: String },
}
