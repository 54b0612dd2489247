//! Remote API access.
//!
//! The gateway speaks raw JSON so the services can decode into their own
//! record types. Every failure (transport, timeout, non-2xx status,
//! unparseable body) surfaces as [`SyncError::RemoteUnavailable`].
//!
//! [`SyncError::RemoteUnavailable`]: crate::SyncError::RemoteUnavailable

mod http;

pub use http::HttpGateway;

use crate::error::SyncResult;
use async_trait::async_trait;
use postsync_types::{EntityKind, RecordId};
use serde_json::Value;

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start: usize,
    pub limit: usize,
}

impl Page {
    pub const fn new(start: usize, limit: usize) -> Self {
        Self { start, limit }
    }
}

/// Request/response access to the remote API.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Lists a collection, optionally windowed.
    async fn list(&self, kind: EntityKind, page: Option<Page>) -> SyncResult<Vec<Value>>;

    /// Fetches one record.
    async fn get(&self, kind: EntityKind, id: RecordId) -> SyncResult<Value>;

    /// Creates a record and returns the server's version, including the
    /// id it assigned.
    async fn create(&self, kind: EntityKind, payload: Value) -> SyncResult<Value>;

    /// Replaces a record.
    async fn update(&self, kind: EntityKind, id: RecordId, payload: Value) -> SyncResult<Value>;

    async fn delete(&self, kind: EntityKind, id: RecordId) -> SyncResult<()>;

    /// Lists the comments attached to a post.
    async fn comments_for_post(&self, post_id: RecordId) -> SyncResult<Vec<Value>>;
}
