//! Per-entity sync service.
//!
//! One generic service covers posts, comments and users. Reads prefer the
//! remote when online and fall back to the local store. Writes go to the
//! remote first when online; when the remote is unreachable (or the device
//! is offline) the write is recorded locally with a sync status and a
//! queued [`SyncOperation`] so the coordinator can replay it later.
//!
//! Records with an unsettled local status are never overwritten by remote
//! reads: the local version is returned instead, so an offline edit
//! survives until it has been replayed.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::{Page, RemoteGateway};
use postsync_storage::{LocalStore, Records};
use postsync_types::{
    is_provisional, is_remote, OperationKind, Record, RecordId, SyncOperation, SyncStatus,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Offline-first access to one entity collection.
pub struct EntityService<R: Record> {
    pub(crate) records: Records<R>,
    pub(crate) remote: Arc<dyn RemoteGateway>,
    pub(crate) connectivity: ConnectivityMonitor,
    page_size: usize,
    assumed_remote_total: usize,
    current_page: Arc<AtomicUsize>,
}

impl<R: Record> Clone for EntityService<R> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            remote: Arc::clone(&self.remote),
            connectivity: self.connectivity.clone(),
            page_size: self.page_size,
            assumed_remote_total: self.assumed_remote_total,
            current_page: Arc::clone(&self.current_page),
        }
    }
}

impl<R: Record> EntityService<R> {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteGateway>,
        connectivity: ConnectivityMonitor,
        config: &SyncConfig,
    ) -> Self {
        Self {
            records: Records::new(store),
            remote,
            connectivity,
            page_size: config.page_size,
            assumed_remote_total: config.assumed_remote_total,
            current_page: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn store(&self) -> &Arc<dyn LocalStore> {
        self.records.store()
    }

    fn not_found(id: RecordId) -> SyncError {
        SyncError::NotFound { kind: R::KIND, id }
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Fetches one record. Online reads of remote ids go to the remote
    /// first; any remote failure falls back to the local copy.
    pub async fn get_by_id(&self, id: RecordId) -> SyncResult<R> {
        if self.connectivity.is_online() && is_remote(id) {
            let fetched = self
                .remote
                .get(R::KIND, id)
                .await
                .and_then(decode::<R>);
            match fetched {
                Ok(record) => return self.absorb(record).await,
                Err(e) => debug!("Remote read of {} {} failed, using local copy: {}", R::KIND, id, e),
            }
        }
        self.records.get(id).await?.ok_or_else(|| Self::not_found(id))
    }

    /// Returns `page_size` records starting at `start`.
    ///
    /// Offline (or when the remote fails) the window is sliced from the
    /// local collection; an empty window is [`SyncError::NoOfflineData`].
    pub async fn list_page(&self, start: usize, page_size: usize) -> SyncResult<Vec<R>> {
        if self.connectivity.is_online() {
            let fetched = self
                .remote
                .list(R::KIND, Some(Page::new(start, page_size)))
                .await
                .and_then(decode_all::<R>);
            match fetched {
                Ok(records) => return self.absorb_batch(records).await,
                Err(e) => warn!("Remote listing of {} failed, serving local data: {}", R::KIND, e),
            }
        }
        self.local_page(start, page_size).await
    }

    async fn local_page(&self, start: usize, page_size: usize) -> SyncResult<Vec<R>> {
        let page: Vec<R> = self
            .records
            .all()
            .await?
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();
        if page.is_empty() && page_size > 0 {
            return Err(SyncError::NoOfflineData { start, page_size });
        }
        Ok(page)
    }

    /// Every locally stored record, tombstones included.
    pub async fn list_local(&self) -> SyncResult<Vec<R>> {
        Ok(self.records.all().await?)
    }

    /// Local records still waiting for the remote.
    pub async fn unsettled(&self) -> SyncResult<Vec<R>> {
        Ok(self
            .records
            .all()
            .await?
            .into_iter()
            .filter(|r| r.sync_status().is_unsettled())
            .collect())
    }

    /// Whether more records exist beyond the `loaded` already shown.
    pub async fn has_more(&self, loaded: usize) -> SyncResult<bool> {
        if self.connectivity.is_online() {
            return Ok(loaded < self.assumed_remote_total);
        }
        Ok(loaded < self.records.count().await?)
    }

    /// Downloads the whole collection into the local store.
    pub async fn fetch_and_store_all(&self) -> SyncResult<Vec<R>> {
        let records = decode_all::<R>(self.remote.list(R::KIND, None).await?)?;
        let stored = self.absorb_batch(records).await?;
        info!("Cached {} {} records locally", stored.len(), R::KIND);
        Ok(stored)
    }

    /// Stores a record fetched from the remote unless the local copy is
    /// unsettled, in which case the local copy wins.
    pub(crate) async fn absorb(&self, mut fetched: R) -> SyncResult<R> {
        let Some(id) = fetched.id() else {
            return Ok(fetched);
        };
        if let Some(local) = self.records.get(id).await? {
            if local.sync_status().is_unsettled() {
                return Ok(local);
            }
            fetched.meta_mut().revision = local.revision();
        }
        fetched.mark(SyncStatus::Synced, None);
        self.records.put(&fetched).await?;
        Ok(fetched)
    }

    /// Batch form of [`Self::absorb`]: one store transaction for the
    /// whole batch. Order is preserved.
    pub(crate) async fn absorb_batch(&self, fetched: Vec<R>) -> SyncResult<Vec<R>> {
        let mut local: HashMap<RecordId, R> = self
            .records
            .all()
            .await?
            .into_iter()
            .filter_map(|r| r.id().map(|id| (id, r)))
            .collect();

        let mut to_store = Vec::with_capacity(fetched.len());
        let mut merged = Vec::with_capacity(fetched.len());
        for mut record in fetched {
            let existing = record.id().and_then(|id| local.remove(&id));
            match existing {
                Some(existing) if existing.sync_status().is_unsettled() => merged.push(existing),
                existing => {
                    if let Some(existing) = existing {
                        record.meta_mut().revision = existing.revision();
                    }
                    record.mark(SyncStatus::Synced, None);
                    if record.id().is_some() {
                        to_store.push(record.clone());
                    }
                    merged.push(record);
                }
            }
        }

        if !to_store.is_empty() {
            self.records.bulk_put(&to_store).await?;
        }
        Ok(merged)
    }

    // ── Pager ────────────────────────────────────────────────────

    /// Loads the first page. Online, an empty local collection is warmed
    /// in the background so later offline reads have data.
    pub async fn load_first(&self) -> SyncResult<Vec<R>> {
        self.reset_pagination();
        if self.connectivity.is_online() && self.records.count().await? == 0 {
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.fetch_and_store_all().await {
                    warn!("Background caching of {} failed: {}", R::KIND, e);
                }
            });
        }
        self.list_page(0, self.page_size).await
    }

    /// Loads the page after the last one loaded.
    pub async fn load_more(&self) -> SyncResult<Vec<R>> {
        let page = self.current_page.fetch_add(1, Ordering::SeqCst) + 1;
        if self.connectivity.is_online() && self.records.count().await? == 0 {
            if let Err(e) = self.fetch_and_store_all().await {
                warn!("Caching {} before paging failed: {}", R::KIND, e);
            }
        }
        self.list_page(page * self.page_size, self.page_size).await
    }

    pub fn reset_pagination(&self) {
        self.current_page.store(0, Ordering::SeqCst);
    }

    /// Zero-based index of the last page loaded.
    pub fn current_page(&self) -> usize {
        self.current_page.load(Ordering::SeqCst)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Creates a record.
    ///
    /// Online, the remote is tried first and its version (with the
    /// server-assigned id) is stored as synced. Otherwise the record is
    /// stored under a provisional id as pending.
    pub async fn create(&self, mut record: R) -> SyncResult<R> {
        record.meta_mut().revision = 1;
        if self.connectivity.is_online() && self.can_push(&record) {
            match self.push_create(&record).await {
                Ok(mut saved) => {
                    saved.mark(SyncStatus::Synced, None);
                    saved.meta_mut().revision = 1;
                    self.records.put(&saved).await?;
                    info!("Created {} {:?} remotely", R::KIND, saved.id());
                    return Ok(saved);
                }
                Err(e) => warn!("Remote create of {} failed, keeping it locally: {}", R::KIND, e),
            }
        }
        record.set_id(self.store().allocate_local_id().await?);
        self.record_locally(record, SyncStatus::Pending, None, OperationKind::Create)
            .await
    }

    async fn push_create(&self, record: &R) -> SyncResult<R> {
        let response = self.remote.create(R::KIND, record.remote_payload()?).await?;
        let saved = decode::<R>(response)?;
        if !saved.has_remote_id() {
            return Err(SyncError::RemoteUnavailable(format!(
                "create {} returned no usable id",
                R::KIND
            )));
        }
        Ok(saved)
    }

    /// Updates a record.
    ///
    /// A record that has never reached the remote stays pending so the
    /// coordinator creates it with the latest content. Its provisional id
    /// must still be stored locally: once a pass has moved it to the
    /// server id, the old handle is [`SyncError::NotFound`]. A remote
    /// failure marks the record `failed` with the error.
    pub async fn update(&self, mut record: R) -> SyncResult<R> {
        let id = record
            .id()
            .ok_or_else(|| SyncError::InvalidRecord(format!("{} update without id", R::KIND)))?;
        let existing = self.records.get(id).await?;

        if is_provisional(id) {
            let Some(existing) = existing else {
                return Err(Self::not_found(id));
            };
            record.meta_mut().revision = existing.revision() + 1;
            return self
                .record_locally(record, SyncStatus::Pending, None, OperationKind::Update)
                .await;
        }
        record.meta_mut().revision = existing.map_or(0, |e| e.revision()) + 1;

        if self.connectivity.is_online() && self.can_push(&record) {
            let pushed = self
                .remote
                .update(R::KIND, id, record.remote_payload()?)
                .await
                .and_then(decode::<R>);
            return match pushed {
                Ok(mut saved) => {
                    saved.set_id(id);
                    saved.mark(SyncStatus::Synced, None);
                    saved.meta_mut().revision = record.revision();
                    self.records.put(&saved).await?;
                    debug!("Updated {} {} remotely", R::KIND, id);
                    Ok(saved)
                }
                Err(e) => {
                    warn!("Remote update of {} {} failed: {}", R::KIND, id, e);
                    self.record_locally(
                        record,
                        SyncStatus::Failed,
                        Some(e.to_string()),
                        OperationKind::Update,
                    )
                    .await
                }
            };
        }

        self.record_locally(record, SyncStatus::Pending, None, OperationKind::Update)
            .await
    }

    /// Deletes a record.
    ///
    /// Online success purges the local copy. Otherwise (offline, or the
    /// remote delete failed) the local copy is kept as a `delete-pending`
    /// tombstone. Records that never reached the remote are purged
    /// outright.
    pub async fn delete(&self, id: RecordId) -> SyncResult<()> {
        if is_provisional(id) {
            if self.records.get(id).await?.is_none() {
                return Err(Self::not_found(id));
            }
            self.records.delete(id).await?;
            debug!("Dropped unsynced {} {}", R::KIND, id);
            return Ok(());
        }

        if self.connectivity.is_online() {
            match self.remote.delete(R::KIND, id).await {
                Ok(()) => {
                    self.records.delete(id).await?;
                    info!("Deleted {} {} remotely", R::KIND, id);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Remote delete of {} {} failed: {}", R::KIND, id, e);
                    return self
                        .tombstone(id, SyncStatus::DeletePending, Some(e.to_string()))
                        .await;
                }
            }
        }

        self.tombstone(id, SyncStatus::DeletePending, None).await
    }

    async fn tombstone(
        &self,
        id: RecordId,
        status: SyncStatus,
        error: Option<String>,
    ) -> SyncResult<()> {
        let mut record = self
            .records
            .get(id)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        record.meta_mut().revision = record.revision() + 1;
        self.record_locally(record, status, error, OperationKind::Delete)
            .await?;
        Ok(())
    }

    /// A record pointing at a parent the remote has not seen yet waits
    /// for the coordinator, which re-points it once the parent syncs.
    fn can_push(&self, record: &R) -> bool {
        match record.provisional_parent() {
            Some((kind, parent)) => {
                debug!("Holding {} back until {} {} is synced", R::KIND, kind, parent);
                false
            }
            None => true,
        }
    }

    /// Persists a locally recorded mutation and queues it for replay.
    async fn record_locally(
        &self,
        mut record: R,
        status: SyncStatus,
        error: Option<String>,
        kind: OperationKind,
    ) -> SyncResult<R> {
        record.mark(status, error);
        self.records.put(&record).await?;
        let operation = SyncOperation::new(kind, R::KIND, record.to_json()?);
        self.store().enqueue(&operation).await?;
        debug!("Recorded {} of {} {:?} as {}", kind, R::KIND, record.id(), status);
        Ok(record)
    }
}

pub(crate) fn decode<R: Record>(value: Value) -> SyncResult<R> {
    Ok(R::from_json(value)?)
}

pub(crate) fn decode_all<R: Record>(values: Vec<Value>) -> SyncResult<Vec<R>> {
    values.into_iter().map(decode::<R>).collect()
}
