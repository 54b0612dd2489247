//! Reconciliation of local changes with the remote.
//!
//! A pass loads every unsettled record (pending, failed, delete-pending,
//! delete-failed) per collection and replays it: create when the record has
//! only a provisional id, update otherwise, delete for tombstones. Within a
//! collection, dispatch follows the queue order of each record's first
//! queued operation and at most `max_concurrent_replays` calls are in
//! flight.
//!
//! Collections run parents first (users, posts, comments). When a create
//! moves a record from its provisional id to the server id, the records
//! under it are re-pointed before their own collection replays. A record
//! whose parent is still provisional is never sent to the remote.
//!
//! Results are written back with a revision compare-and-set. A record that
//! was edited locally while its replay was in flight keeps the newer edit
//! (outcome [`ReplayResult::Superseded`]) and is picked up by the next pass.
//!
//! The sync queue is cleared through the last operation seen at the start
//! of the pass, and only if every record in the pass reached a settled
//! outcome.

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::notify::{Notification, Notifier};
use crate::remote::RemoteGateway;
use crate::service::{decode, decode_all};
use futures::stream::{self, StreamExt};
use postsync_storage::{LocalStore, Records};
use postsync_types::{
    is_remote, Comment, EntityKind, Post, QueuedOperation, Record, RecordId, SyncStatus, User,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a replay asked the remote to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayAction {
    Create,
    Update,
    Delete,
}

/// How a single record's replay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayResult {
    /// Confirmed by the remote; `id` is the record's (possibly new) id.
    Synced { id: RecordId },
    /// Remote delete confirmed and the local tombstone removed.
    Purged,
    /// Create or update rejected; the record is now `failed`.
    Failed(String),
    /// Delete rejected; the record is now `delete-failed`.
    DeleteFailed(String),
    /// Not dispatched: the device went offline, or the record's parent
    /// has not reached the remote yet.
    Skipped,
    /// A newer local edit landed while the call was in flight.
    Superseded,
    /// The remote call finished but the result could not be stored.
    Unrecorded(String),
}

impl ReplayResult {
    /// Settled outcomes let the pass clear the queue.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Skipped | Self::Unrecorded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub kind: EntityKind,
    /// The id the record had when the pass started.
    pub id: RecordId,
    pub action: ReplayAction,
    pub result: ReplayResult,
}

/// Aggregated result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<RecordOutcome>,
    /// Queue entries removed at the end of the pass.
    pub drained_operations: usize,
    pub queue_cleared: bool,
    /// Collections skipped because another pass was already running.
    pub busy: Vec<EntityKind>,
    /// Collections whose records could not be loaded, with the error.
    pub failed_kinds: Vec<(EntityKind, String)>,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.count(|r| matches!(r, ReplayResult::Synced { .. }))
    }

    pub fn purged(&self) -> usize {
        self.count(|r| matches!(r, ReplayResult::Purged))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, ReplayResult::Failed(_) | ReplayResult::DeleteFailed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, ReplayResult::Skipped))
    }

    /// True when nothing needed replaying.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && self.busy.is_empty() && self.failed_kinds.is_empty()
    }

    pub fn outcomes_for(&self, kind: EntityKind) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }

    fn count(&self, pred: impl Fn(&ReplayResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }
}

/// Result of pulling one collection in [`SyncCoordinator::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Number of records the remote version replaced or added.
    Updated(usize),
    Busy,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub collections: Vec<(EntityKind, RefreshOutcome)>,
}

impl RefreshReport {
    pub fn outcome(&self, kind: EntityKind) -> Option<&RefreshOutcome> {
        self.collections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }
}

/// Per-status record counts for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub kind: EntityKind,
    pub total: usize,
    pub by_status: Vec<(SyncStatus, usize)>,
}

impl CollectionStatus {
    pub fn count(&self, status: SyncStatus) -> usize {
        self.by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub collections: Vec<CollectionStatus>,
    pub queued_operations: usize,
}

const REPOINT_ATTEMPTS: usize = 3;

enum KindPass {
    Done(Vec<RecordOutcome>),
    Busy(EntityKind),
}

/// Replays locally recorded changes against the remote.
pub struct SyncCoordinator {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    connectivity: ConnectivityMonitor,
    notifier: Notifier,
    max_concurrent: usize,
    guards: HashMap<EntityKind, Arc<Mutex<()>>>,
    active: AtomicUsize,
    in_progress: watch::Sender<bool>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteGateway>,
        connectivity: ConnectivityMonitor,
        notifier: Notifier,
        max_concurrent: usize,
    ) -> Self {
        let guards = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Mutex::new(()))))
            .collect();
        let (in_progress, _rx) = watch::channel(false);
        Self {
            store,
            remote,
            connectivity,
            notifier,
            max_concurrent: max_concurrent.max(1),
            guards,
            active: AtomicUsize::new(0),
            in_progress,
        }
    }

    /// Signal that is true while any pass or refresh is running.
    pub fn sync_in_progress(&self) -> watch::Receiver<bool> {
        self.in_progress.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        *self.in_progress.borrow()
    }

    fn begin(&self) -> Activity<'_> {
        if self.active.fetch_add(1, Ordering::SeqCst) == 0 {
            self.in_progress.send_replace(true);
        }
        Activity { coordinator: self }
    }

    fn guard(&self, kind: EntityKind) -> Arc<Mutex<()>> {
        self.guards
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }

    // ── Reconciliation ───────────────────────────────────────────

    /// Runs one reconciliation pass over all collections.
    pub async fn reconcile(&self) -> SyncResult<SyncReport> {
        let _activity = self.begin();
        let queued = self.store.pending_operations().await?;
        let high_water = queued.last().map(|q| q.seq);
        let order = first_queued(&queued);

        let users = self.reconcile_kind::<User>(&order).await;
        let posts = self.reconcile_kind::<Post>(&order).await;
        let comments = self.reconcile_kind::<Comment>(&order).await;

        let mut report = SyncReport::default();
        let passes = [
            (EntityKind::User, users),
            (EntityKind::Post, posts),
            (EntityKind::Comment, comments),
        ];
        for (kind, pass) in passes {
            match pass {
                Ok(KindPass::Done(outcomes)) => report.outcomes.extend(outcomes),
                Ok(KindPass::Busy(kind)) => report.busy.push(kind),
                Err(e) => {
                    warn!("Reconciliation of {} failed: {}", kind, e);
                    report.failed_kinds.push((kind, e.to_string()));
                }
            }
        }

        let settled = report.busy.is_empty()
            && report.failed_kinds.is_empty()
            && report.outcomes.iter().all(|o| o.result.is_settled());
        if let Some(seq) = high_water {
            if settled {
                report.drained_operations = self.store.clear_queue_through(seq).await?;
                report.queue_cleared = true;
            } else {
                debug!("Keeping {} queued operations for the next pass", queued.len());
            }
        }

        if !report.outcomes.is_empty() {
            info!(
                "Reconciliation finished: {} synced, {} purged, {} failed, {} skipped",
                report.synced(),
                report.purged(),
                report.failed(),
                report.skipped()
            );
        }
        for (kind, error) in &report.failed_kinds {
            self.notifier.notify(Notification::SyncError(format!(
                "could not reconcile {kind}: {error}"
            )));
        }
        if report.failed() > 0 {
            self.notifier.notify(Notification::SyncFailures {
                failed: report.failed(),
            });
        }
        if report.synced() + report.purged() > 0 {
            self.notifier.notify(Notification::SyncCompleted {
                synced: report.synced(),
                purged: report.purged(),
            });
        }
        Ok(report)
    }

    async fn reconcile_kind<R: Record>(
        &self,
        order: &HashMap<(EntityKind, RecordId), u64>,
    ) -> SyncResult<KindPass> {
        let guard = self.guard(R::KIND);
        let Ok(_lock) = guard.try_lock() else {
            info!("Reconciliation of {} already running, skipping", R::KIND);
            return Ok(KindPass::Busy(R::KIND));
        };

        let records = Records::<R>::new(Arc::clone(&self.store));
        let mut candidates: Vec<(RecordId, R)> = records
            .all()
            .await?
            .into_iter()
            .filter(|r| r.sync_status().is_unsettled())
            .filter_map(|r| r.id().map(|id| (id, r)))
            .collect();
        if candidates.is_empty() {
            return Ok(KindPass::Done(Vec::new()));
        }
        candidates.sort_by_key(|(id, _)| order.get(&(R::KIND, *id)).copied().unwrap_or(u64::MAX));

        info!("Replaying {} unsettled {} records", candidates.len(), R::KIND);
        let outcomes = stream::iter(candidates)
            .map(|(id, record)| self.replay(&records, id, record))
            .buffer_unordered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;
        Ok(KindPass::Done(outcomes))
    }

    async fn replay<R: Record>(&self, records: &Records<R>, id: RecordId, record: R) -> RecordOutcome {
        let action = if record.sync_status().is_tombstone() {
            ReplayAction::Delete
        } else if record.has_remote_id() {
            ReplayAction::Update
        } else {
            ReplayAction::Create
        };
        let outcome = |result| RecordOutcome {
            kind: R::KIND,
            id,
            action,
            result,
        };

        if !self.connectivity.is_online() {
            return outcome(ReplayResult::Skipped);
        }

        let result = match (action, record.provisional_parent()) {
            (ReplayAction::Delete, _) => self.replay_delete(records, id, record).await,
            (_, Some((kind, parent))) => self.hold_back(records, id, record, kind, parent).await,
            _ => self.replay_write(records, id, action, record).await,
        };
        match result {
            Ok(result) => outcome(result),
            Err(e) => {
                warn!("Could not record replay of {} {}: {}", R::KIND, id, e);
                outcome(ReplayResult::Unrecorded(e.to_string()))
            }
        }
    }

    async fn replay_write<R: Record>(
        &self,
        records: &Records<R>,
        id: RecordId,
        action: ReplayAction,
        record: R,
    ) -> SyncResult<ReplayResult> {
        let revision = record.revision();
        let pushed = match record.remote_payload() {
            Ok(payload) => match action {
                ReplayAction::Create => self.remote.create(R::KIND, payload).await,
                _ => self.remote.update(R::KIND, id, payload).await,
            },
            Err(e) => Err(e.into()),
        };
        let saved = pushed.and_then(decode::<R>).and_then(|mut saved| {
            if action == ReplayAction::Update {
                saved.set_id(id);
            } else if !saved.has_remote_id() {
                return Err(SyncError::RemoteUnavailable(format!(
                    "create {} returned no usable id",
                    R::KIND
                )));
            }
            Ok(saved)
        });

        let mut saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                debug!("Replay of {} {} failed: {}", R::KIND, id, e);
                let message = e.to_string();
                let mut failed = record;
                failed.mark(SyncStatus::Failed, Some(message.clone()));
                return Ok(if records.replace_if_revision(id, revision, &failed).await? {
                    ReplayResult::Failed(message)
                } else {
                    ReplayResult::Superseded
                });
            }
        };

        let new_id = saved.id().unwrap_or(id);
        saved.mark(SyncStatus::Synced, None);
        saved.meta_mut().revision = revision;
        if records.replace_if_revision(id, revision, &saved).await? {
            debug!("Replayed {} {} as {}", R::KIND, id, new_id);
            if new_id != id {
                self.adopt_children(R::KIND, id, new_id).await?;
            }
            return Ok(ReplayResult::Synced { id: new_id });
        }

        // The remote now knows the record under its new id; move the newer
        // local edit there so the next pass updates instead of creating.
        if new_id != id {
            if let Some(mut current) = records.get(id).await? {
                let current_revision = current.revision();
                current.set_id(new_id);
                if records
                    .replace_if_revision(id, current_revision, &current)
                    .await?
                {
                    self.adopt_children(R::KIND, id, new_id).await?;
                }
            }
        }
        Ok(ReplayResult::Superseded)
    }

    /// Keeps a record away from the remote while its parent only has a
    /// provisional id. A parent that vanished locally will never sync, so
    /// the record is marked `failed` instead.
    async fn hold_back<R: Record>(
        &self,
        records: &Records<R>,
        id: RecordId,
        record: R,
        parent_kind: EntityKind,
        parent: RecordId,
    ) -> SyncResult<ReplayResult> {
        if self.store.get(parent_kind.collection(), parent).await?.is_some() {
            debug!(
                "Holding {} {} until {} {} is synced",
                R::KIND,
                id,
                parent_kind,
                parent
            );
            return Ok(ReplayResult::Skipped);
        }

        let message = format!("{parent_kind} {parent} was never synced");
        let revision = record.revision();
        let mut failed = record;
        failed.mark(SyncStatus::Failed, Some(message.clone()));
        Ok(if records.replace_if_revision(id, revision, &failed).await? {
            ReplayResult::Failed(message)
        } else {
            ReplayResult::Superseded
        })
    }

    /// Re-points records whose parent moved from `old` to `new`.
    async fn adopt_children(
        &self,
        parent: EntityKind,
        old: RecordId,
        new: RecordId,
    ) -> SyncResult<usize> {
        match parent {
            EntityKind::User => self.repoint::<Post>(parent, old, new).await,
            EntityKind::Post => self.repoint::<Comment>(parent, old, new).await,
            EntityKind::Comment => Ok(0),
        }
    }

    async fn repoint<C: Record>(
        &self,
        parent: EntityKind,
        old: RecordId,
        new: RecordId,
    ) -> SyncResult<usize> {
        let records = Records::<C>::new(Arc::clone(&self.store));
        let children: Vec<RecordId> = records
            .all()
            .await?
            .into_iter()
            .filter(|c| c.parent() == Some((parent, old)))
            .filter_map(|c| c.id())
            .collect();

        let mut moved = 0;
        for id in children {
            // A local edit can land between read and write; re-read and retry.
            for _ in 0..REPOINT_ATTEMPTS {
                let Some(mut child) = records.get(id).await? else {
                    break;
                };
                if child.parent() != Some((parent, old)) {
                    break;
                }
                let revision = child.revision();
                child.set_parent_id(new);
                if records.replace_if_revision(id, revision, &child).await? {
                    moved += 1;
                    break;
                }
            }
        }
        if moved > 0 {
            debug!("Moved {} {} records from {} {} to {}", moved, C::KIND, parent, old, new);
        }
        Ok(moved)
    }

    async fn replay_delete<R: Record>(
        &self,
        records: &Records<R>,
        id: RecordId,
        record: R,
    ) -> SyncResult<ReplayResult> {
        let revision = record.revision();
        match self.remote.delete(R::KIND, id).await {
            Ok(()) => Ok(if records.delete_if_revision(id, revision).await? {
                ReplayResult::Purged
            } else {
                ReplayResult::Superseded
            }),
            Err(e) => {
                debug!("Replayed delete of {} {} failed: {}", R::KIND, id, e);
                let message = e.to_string();
                let mut failed = record;
                failed.mark(SyncStatus::DeleteFailed, Some(message.clone()));
                Ok(if records.replace_if_revision(id, revision, &failed).await? {
                    ReplayResult::DeleteFailed(message)
                } else {
                    ReplayResult::Superseded
                })
            }
        }
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Pulls every collection from the remote and applies the conflict
    /// rule. Each collection is written with one atomic batch.
    pub async fn refresh(&self) -> RefreshReport {
        let _activity = self.begin();
        let (posts, comments, users) = tokio::join!(
            self.refresh_kind::<Post>(),
            self.refresh_kind::<Comment>(),
            self.refresh_kind::<User>(),
        );
        RefreshReport {
            collections: vec![
                (EntityKind::Post, posts),
                (EntityKind::Comment, comments),
                (EntityKind::User, users),
            ],
        }
    }

    async fn refresh_kind<R: Record>(&self) -> RefreshOutcome {
        let guard = self.guard(R::KIND);
        let Ok(_lock) = guard.try_lock() else {
            return RefreshOutcome::Busy;
        };
        match self.pull::<R>().await {
            Ok(updated) => {
                info!("Refreshed {}: {} records updated", R::KIND, updated);
                RefreshOutcome::Updated(updated)
            }
            Err(e) => {
                warn!("Refresh of {} failed: {}", R::KIND, e);
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    async fn pull<R: Record>(&self) -> SyncResult<usize> {
        let fetched = decode_all::<R>(self.remote.list(R::KIND, None).await?)?;
        let records = Records::<R>::new(Arc::clone(&self.store));
        let local: HashMap<RecordId, R> = records
            .all()
            .await?
            .into_iter()
            .filter_map(|r| r.id().map(|id| (id, r)))
            .collect();

        let winners: Vec<R> = fetched
            .into_iter()
            .filter(|r| r.id().is_some_and(is_remote))
            .filter_map(|mut remote| {
                let existing = remote.id().and_then(|id| local.get(&id));
                if existing.is_some_and(|l| l.sync_status().is_unsettled())
                    || !remote_wins(existing, &remote)
                {
                    return None;
                }
                remote.mark(SyncStatus::Synced, None);
                remote.meta_mut().revision = existing.map_or(0, |l| l.revision() + 1);
                Some(remote)
            })
            .collect();

        records.bulk_put(&winners).await?;
        Ok(winners.len())
    }

    // ── Status ───────────────────────────────────────────────────

    /// Record counts by sync status, plus the queue length.
    pub async fn status(&self) -> SyncResult<StatusSummary> {
        let mut collections = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let stored = self.store.get_all(kind.collection()).await?;
            let by_status = SyncStatus::ALL
                .into_iter()
                .map(|status| {
                    let n = stored.iter().filter(|v| stored_status(v) == status).count();
                    (status, n)
                })
                .collect();
            collections.push(CollectionStatus {
                kind,
                total: stored.len(),
                by_status,
            });
        }
        let queued_operations = self
            .store
            .count(postsync_types::Collection::SyncQueue)
            .await?;
        Ok(StatusSummary {
            collections,
            queued_operations,
        })
    }

    // ── Auto-sync ────────────────────────────────────────────────

    /// Watches connectivity: going online announces it and runs a pass,
    /// going offline announces offline mode. Runs until aborted.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut subscription = self.connectivity.subscribe();
        tokio::spawn(async move {
            let mut online = subscription.current();
            while let Some(now_online) = subscription.changed().await {
                if now_online == online {
                    continue;
                }
                online = now_online;
                if !now_online {
                    coordinator.notifier.notify(Notification::Offline);
                    continue;
                }
                coordinator.notifier.notify(Notification::BackOnline);
                if let Err(e) = coordinator.reconcile().await {
                    warn!("Automatic reconciliation failed: {}", e);
                    coordinator
                        .notifier
                        .notify(Notification::SyncError(e.to_string()));
                }
            }
            debug!("Connectivity monitor gone, stopping auto-sync");
        })
    }
}

/// Keeps the in-progress signal raised while any pass is running.
struct Activity<'a> {
    coordinator: &'a SyncCoordinator,
}

impl Drop for Activity<'_> {
    fn drop(&mut self) {
        if self.coordinator.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.coordinator.in_progress.send_replace(false);
        }
    }
}

/// Bulk refresh conflict rule: the remote version replaces the local one
/// when there is no local one, or when both carry `updatedAt` and the
/// remote's is strictly newer.
pub fn remote_wins<R: Record>(local: Option<&R>, remote: &R) -> bool {
    match local {
        None => true,
        Some(local) => matches!(
            (local.updated_at(), remote.updated_at()),
            (Some(l), Some(r)) if r > l
        ),
    }
}

/// Sequence number of each record's first queued operation.
fn first_queued(queued: &[QueuedOperation]) -> HashMap<(EntityKind, RecordId), u64> {
    let mut order = HashMap::new();
    for entry in queued {
        if let Some(id) = entry.operation.record_id() {
            order
                .entry((entry.operation.entity_type, id))
                .or_insert(entry.seq);
        }
    }
    order
}

fn stored_status(value: &Value) -> SyncStatus {
    value
        .get("syncStatus")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}
