//! Typed access to one entity collection.

use crate::error::{StorageError, StorageResult};
use crate::store::LocalStore;
use postsync_types::{Collection, Record, RecordId};
use std::marker::PhantomData;
use std::sync::Arc;

/// A view of the collection holding records of type `R`.
pub struct Records<R> {
    store: Arc<dyn LocalStore>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Records<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Records<R> {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// The collection this view reads and writes.
    pub fn collection(&self) -> Collection {
        R::KIND.collection()
    }

    /// The underlying untyped store.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub async fn get(&self, id: RecordId) -> StorageResult<Option<R>> {
        self.store
            .get(self.collection(), id)
            .await?
            .map(decode::<R>)
            .transpose()
    }

    pub async fn all(&self) -> StorageResult<Vec<R>> {
        self.store
            .get_all(self.collection())
            .await?
            .into_iter()
            .map(decode::<R>)
            .collect()
    }

    pub async fn put(&self, record: &R) -> StorageResult<()> {
        self.store.put(self.collection(), encode(record)?).await
    }

    pub async fn delete(&self, id: RecordId) -> StorageResult<()> {
        self.store.delete(self.collection(), id).await
    }

    pub async fn bulk_put(&self, records: &[R]) -> StorageResult<()> {
        let values = records.iter().map(encode).collect::<StorageResult<Vec<_>>>()?;
        self.store.bulk_put(self.collection(), values).await
    }

    pub async fn count(&self) -> StorageResult<usize> {
        self.store.count(self.collection()).await
    }

    /// See [`LocalStore::replace_if_revision`].
    pub async fn replace_if_revision(
        &self,
        current_id: RecordId,
        expected_revision: u64,
        record: &R,
    ) -> StorageResult<bool> {
        self.store
            .replace_if_revision(self.collection(), current_id, expected_revision, encode(record)?)
            .await
    }

    /// See [`LocalStore::delete_if_revision`].
    pub async fn delete_if_revision(
        &self,
        id: RecordId,
        expected_revision: u64,
    ) -> StorageResult<bool> {
        self.store
            .delete_if_revision(self.collection(), id, expected_revision)
            .await
    }
}

fn encode<R: Record>(record: &R) -> StorageResult<serde_json::Value> {
    if record.id().is_none() {
        return Err(StorageError::InvalidData(format!(
            "{} record has no id",
            R::KIND
        )));
    }
    Ok(serde_json::to_value(record)?)
}

fn decode<R: Record>(value: serde_json::Value) -> StorageResult<R> {
    Ok(serde_json::from_value(value)?)
}
