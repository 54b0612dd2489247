//! The local store boundary.

use crate::error::StorageResult;
use async_trait::async_trait;
use postsync_types::{Collection, QueuedOperation, RecordId, SyncOperation};
use serde_json::Value;

/// Durable key-indexed storage for the entity collections plus the sync
/// queue.
///
/// Entity records are JSON objects keyed by their `id` field; `put` is an
/// upsert with last-write-wins semantics. The sync queue is only reachable
/// through the queue methods.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Looks up one record.
    async fn get(&self, collection: Collection, id: RecordId) -> StorageResult<Option<Value>>;

    /// Returns every record in the collection: remote ids ascending, then
    /// provisional ids in allocation order.
    async fn get_all(&self, collection: Collection) -> StorageResult<Vec<Value>>;

    /// Inserts or overwrites the record stored under `record["id"]`.
    async fn put(&self, collection: Collection, record: Value) -> StorageResult<()>;

    /// Removes a record. Removing an absent record is not an error.
    async fn delete(&self, collection: Collection, id: RecordId) -> StorageResult<()>;

    /// Writes every record or none of them.
    async fn bulk_put(&self, collection: Collection, records: Vec<Value>) -> StorageResult<()>;

    /// Number of records in the collection.
    async fn count(&self, collection: Collection) -> StorageResult<usize>;

    /// Hands out a fresh provisional id (`< 0`), never reused.
    async fn allocate_local_id(&self) -> StorageResult<RecordId>;

    /// Atomically replaces the record stored under `current_id` with
    /// `record` (which may carry a different id), provided the stored
    /// record's `revision` still equals `expected_revision`.
    ///
    /// Returns false, writing nothing, if the record is gone or its
    /// revision moved on.
    async fn replace_if_revision(
        &self,
        collection: Collection,
        current_id: RecordId,
        expected_revision: u64,
        record: Value,
    ) -> StorageResult<bool>;

    /// Removes the record if its `revision` still equals `expected_revision`.
    async fn delete_if_revision(
        &self,
        collection: Collection,
        id: RecordId,
        expected_revision: u64,
    ) -> StorageResult<bool>;

    /// Appends an operation to the sync queue and returns its sequence number.
    async fn enqueue(&self, operation: &SyncOperation) -> StorageResult<u64>;

    /// Returns all queued operations in FIFO order.
    async fn pending_operations(&self) -> StorageResult<Vec<QueuedOperation>>;

    /// Removes queued operations with a sequence number `<= seq`.
    /// Returns how many were removed.
    async fn clear_queue_through(&self, seq: u64) -> StorageResult<usize>;

    /// Removes every queued operation.
    async fn clear_queue(&self) -> StorageResult<()>;
}
