//! Shared test fixtures: an in-memory remote with call recording, failure
//! injection and a gate that holds writes in flight.

#![allow(dead_code)]

use async_trait::async_trait;
use postsync_storage::{LocalStore, SqliteStore};
use postsync_sync::{
    ConnectivityMonitor, Page, RemoteGateway, SyncConfig, SyncEngine, SyncError, SyncResult,
};
use postsync_types::{EntityKind, RecordId};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(EntityKind, Option<Page>),
    Get(EntityKind, RecordId),
    Create(EntityKind),
    Update(EntityKind, RecordId),
    Delete(EntityKind, RecordId),
    CommentsForPost(RecordId),
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Update(..) | Self::Delete(..))
    }
}

/// In-memory stand-in for the REST API. Created ids start at 101, like
/// JSONPlaceholder.
pub struct FakeRemote {
    data: Mutex<HashMap<(EntityKind, RecordId), Value>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
    failing: AtomicBool,
    failing_kinds: Mutex<HashSet<EntityKind>>,
    hold_writes: AtomicBool,
    /// Signalled when a held write reaches the remote.
    pub entered: Notify,
    /// Signal once per held write to let it complete.
    pub release: Notify,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(101),
            failing: AtomicBool::new(false),
            failing_kinds: Mutex::new(HashSet::new()),
            hold_writes: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn seed(&self, kind: EntityKind, record: Value) {
        let id = record["id"].as_i64().unwrap();
        self.data.lock().unwrap().insert((kind, id), record);
    }

    pub fn record(&self, kind: EntityKind, id: RecordId) -> Option<Value> {
        self.data.lock().unwrap().get(&(kind, id)).cloned()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.data
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Every call fails with `RemoteUnavailable` until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls for one entity kind fail until reset.
    pub fn fail_kind(&self, kind: EntityKind, failing: bool) {
        let mut kinds = self.failing_kinds.lock().unwrap();
        if failing {
            kinds.insert(kind);
        } else {
            kinds.remove(&kind);
        }
    }

    /// Holds create/update/delete calls until `release` is notified.
    pub fn hold_writes(&self, hold: bool) {
        self.hold_writes.store(hold, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn enter(&self, call: Call) -> SyncResult<()> {
        let kind = match &call {
            Call::List(k, _) | Call::Get(k, _) | Call::Create(k) => *k,
            Call::Update(k, _) | Call::Delete(k, _) => *k,
            Call::CommentsForPost(_) => EntityKind::Comment,
        };
        let write = call.is_write();
        self.calls.lock().unwrap().push(call);

        if write && self.hold_writes.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) || self.failing_kinds.lock().unwrap().contains(&kind) {
            return Err(SyncError::RemoteUnavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn missing(kind: EntityKind, id: RecordId) -> SyncError {
        SyncError::RemoteUnavailable(format!("get {kind} {id} returned HTTP 404 Not Found"))
    }
}

#[async_trait]
impl RemoteGateway for FakeRemote {
    async fn list(&self, kind: EntityKind, page: Option<Page>) -> SyncResult<Vec<Value>> {
        self.enter(Call::List(kind, page)).await?;
        let mut records: Vec<(RecordId, Value)> = self
            .data
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), v)| (*id, v.clone()))
            .collect();
        records.sort_by_key(|(id, _)| *id);
        let all = records.into_iter().map(|(_, v)| v);
        Ok(match page {
            Some(page) => all.skip(page.start).take(page.limit).collect(),
            None => all.collect(),
        })
    }

    async fn get(&self, kind: EntityKind, id: RecordId) -> SyncResult<Value> {
        self.enter(Call::Get(kind, id)).await?;
        self.record(kind, id).ok_or_else(|| Self::missing(kind, id))
    }

    async fn create(&self, kind: EntityKind, payload: Value) -> SyncResult<Value> {
        self.enter(Call::Create(kind)).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut saved = payload;
        saved["id"] = json!(id);
        self.seed(kind, saved.clone());
        Ok(saved)
    }

    async fn update(&self, kind: EntityKind, id: RecordId, payload: Value) -> SyncResult<Value> {
        self.enter(Call::Update(kind, id)).await?;
        let mut saved = payload;
        saved["id"] = json!(id);
        self.seed(kind, saved.clone());
        Ok(saved)
    }

    async fn delete(&self, kind: EntityKind, id: RecordId) -> SyncResult<()> {
        self.enter(Call::Delete(kind, id)).await?;
        self.data.lock().unwrap().remove(&(kind, id));
        Ok(())
    }

    async fn comments_for_post(&self, post_id: RecordId) -> SyncResult<Vec<Value>> {
        self.enter(Call::CommentsForPost(post_id)).await?;
        let mut comments: Vec<(RecordId, Value)> = self
            .data
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _), v)| *k == EntityKind::Comment && v["postId"] == json!(post_id))
            .map(|((_, id), v)| (*id, v.clone()))
            .collect();
        comments.sort_by_key(|(id, _)| *id);
        Ok(comments.into_iter().map(|(_, v)| v).collect())
    }
}

pub struct Harness {
    pub engine: SyncEngine,
    pub remote: Arc<FakeRemote>,
    pub store: Arc<SqliteStore>,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        Self::with_config(online, SyncConfig::default())
    }

    pub fn with_config(online: bool, config: SyncConfig) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let remote = FakeRemote::new();
        let engine = SyncEngine::new(
            config,
            Arc::clone(&store) as Arc<dyn LocalStore>,
            Arc::clone(&remote) as Arc<dyn RemoteGateway>,
            ConnectivityMonitor::new(online),
        );
        Self {
            engine,
            remote,
            store,
        }
    }

    pub fn go_online(&self) {
        self.engine.connectivity().set_online(true);
    }

    pub fn go_offline(&self) {
        self.engine.connectivity().set_online(false);
    }
}

pub fn remote_post(id: RecordId, title: &str) -> Value {
    json!({ "id": id, "userId": 1, "title": title, "body": format!("body of {title}") })
}

pub fn remote_user(id: RecordId, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "username": name.to_lowercase(),
        "email": format!("{}@example.com", name.to_lowercase()),
    })
}

pub fn remote_comment(id: RecordId, post_id: RecordId) -> Value {
    json!({
        "id": id,
        "postId": post_id,
        "name": format!("comment {id}"),
        "email": "c@example.com",
        "body": "nice",
    })
}
