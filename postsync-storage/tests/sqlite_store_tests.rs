use postsync_storage::{LocalStore, Records, SqliteStore, StorageError};
use postsync_types::{
    Collection, EntityKind, OperationKind, Post, Record, SyncOperation, SyncStatus,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn make_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

fn post(id: i64, title: &str) -> Post {
    let mut post = Post::new(1, title, "body");
    post.set_id(id);
    post
}

// ── Keyed collections ────────────────────────────────────────────

#[tokio::test]
async fn get_missing_returns_none() {
    let store = make_store();
    assert!(store.get(Collection::Posts, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn put_is_last_write_wins() {
    let store = make_store();
    store
        .put(Collection::Posts, json!({ "id": 1, "title": "first" }))
        .await
        .unwrap();
    store
        .put(Collection::Posts, json!({ "id": 1, "title": "second" }))
        .await
        .unwrap();

    let stored = store.get(Collection::Posts, 1).await.unwrap().unwrap();
    assert_eq!(stored["title"], "second");
    assert_eq!(store.count(Collection::Posts).await.unwrap(), 1);
}

#[tokio::test]
async fn put_without_id_is_rejected() {
    let store = make_store();
    let result = store.put(Collection::Users, json!({ "name": "x" })).await;
    assert!(matches!(result, Err(StorageError::InvalidData(_))));
}

#[tokio::test]
async fn collections_are_independent() {
    let store = make_store();
    store.put(Collection::Posts, json!({ "id": 1 })).await.unwrap();
    store.put(Collection::Comments, json!({ "id": 1 })).await.unwrap();
    store.delete(Collection::Posts, 1).await.unwrap();

    assert!(store.get(Collection::Posts, 1).await.unwrap().is_none());
    assert!(store.get(Collection::Comments, 1).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_absent_record_is_ok() {
    let store = make_store();
    store.delete(Collection::Users, 42).await.unwrap();
}

#[tokio::test]
async fn get_all_orders_remote_ids_before_provisional() {
    let store = make_store();
    for id in [3, -1, 1, -2, 2] {
        store.put(Collection::Posts, json!({ "id": id })).await.unwrap();
    }

    let ids: Vec<i64> = store
        .get_all(Collection::Posts)
        .await
        .unwrap()
        .iter()
        .map(|v| v["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, -1, -2]);
}

#[tokio::test]
async fn bulk_put_is_all_or_nothing() {
    let store = make_store();
    let batch = vec![json!({ "id": 1 }), json!({ "id": 2 }), json!({ "no_id": true })];

    let result = store.bulk_put(Collection::Posts, batch).await;
    assert!(result.is_err());
    assert_eq!(store.count(Collection::Posts).await.unwrap(), 0);

    store
        .bulk_put(Collection::Posts, vec![json!({ "id": 1 }), json!({ "id": 2 })])
        .await
        .unwrap();
    assert_eq!(store.count(Collection::Posts).await.unwrap(), 2);
}

#[tokio::test]
async fn queue_collection_is_not_keyed() {
    let store = make_store();
    let result = store.get(Collection::SyncQueue, 1).await;
    assert!(matches!(result, Err(StorageError::InvalidData(_))));
}

// ── Provisional ids ──────────────────────────────────────────────

#[tokio::test]
async fn allocate_local_id_is_negative_and_monotonic() {
    let store = make_store();
    let a = store.allocate_local_id().await.unwrap();
    let b = store.allocate_local_id().await.unwrap();
    let c = store.allocate_local_id().await.unwrap();
    assert_eq!((a, b, c), (-1, -2, -3));
}

#[tokio::test]
async fn local_ids_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.allocate_local_id().await.unwrap();
        store.allocate_local_id().await.unwrap();
        store.put(Collection::Posts, json!({ "id": -2 })).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.allocate_local_id().await.unwrap(), -3);
    assert!(store.get(Collection::Posts, -2).await.unwrap().is_some());
}

// ── Compare-and-set ──────────────────────────────────────────────

#[tokio::test]
async fn replace_if_revision_rekeys_atomically() {
    let store = make_store();
    store
        .put(Collection::Posts, json!({ "id": -1, "revision": 1, "title": "draft" }))
        .await
        .unwrap();

    let replaced = store
        .replace_if_revision(
            Collection::Posts,
            -1,
            1,
            json!({ "id": 101, "revision": 1, "title": "draft" }),
        )
        .await
        .unwrap();

    assert!(replaced);
    assert!(store.get(Collection::Posts, -1).await.unwrap().is_none());
    assert_eq!(
        store.get(Collection::Posts, 101).await.unwrap().unwrap()["title"],
        "draft"
    );
}

#[tokio::test]
async fn replace_if_revision_refuses_stale_revision() {
    let store = make_store();
    store
        .put(Collection::Posts, json!({ "id": 5, "revision": 3, "title": "newer" }))
        .await
        .unwrap();

    let replaced = store
        .replace_if_revision(Collection::Posts, 5, 2, json!({ "id": 5, "title": "older" }))
        .await
        .unwrap();

    assert!(!replaced);
    assert_eq!(
        store.get(Collection::Posts, 5).await.unwrap().unwrap()["title"],
        "newer"
    );
}

#[tokio::test]
async fn replace_if_revision_on_missing_record() {
    let store = make_store();
    let replaced = store
        .replace_if_revision(Collection::Users, 9, 0, json!({ "id": 9 }))
        .await
        .unwrap();
    assert!(!replaced);
    assert_eq!(store.count(Collection::Users).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_if_revision_checks_revision() {
    let store = make_store();
    store
        .put(Collection::Comments, json!({ "id": 4, "revision": 2 }))
        .await
        .unwrap();

    assert!(!store.delete_if_revision(Collection::Comments, 4, 1).await.unwrap());
    assert!(store.delete_if_revision(Collection::Comments, 4, 2).await.unwrap());
    assert!(store.get(Collection::Comments, 4).await.unwrap().is_none());
}

// ── Sync queue ───────────────────────────────────────────────────

fn op(kind: OperationKind, id: i64) -> SyncOperation {
    SyncOperation::new(kind, EntityKind::Post, json!({ "id": id }))
}

#[tokio::test]
async fn queue_is_fifo() {
    let store = make_store();
    store.enqueue(&op(OperationKind::Create, -1)).await.unwrap();
    store.enqueue(&op(OperationKind::Update, 2)).await.unwrap();
    store.enqueue(&op(OperationKind::Delete, 3)).await.unwrap();

    let queued = store.pending_operations().await.unwrap();
    let kinds: Vec<OperationKind> = queued.iter().map(|q| q.operation.kind).collect();
    assert_eq!(
        kinds,
        vec![OperationKind::Create, OperationKind::Update, OperationKind::Delete]
    );
    assert!(queued.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(store.count(Collection::SyncQueue).await.unwrap(), 3);
    assert_eq!(store.get_all(Collection::SyncQueue).await.unwrap().len(), 3);
}

#[tokio::test]
async fn clear_queue_through_keeps_later_entries() {
    let store = make_store();
    let first = store.enqueue(&op(OperationKind::Create, -1)).await.unwrap();
    let second = store.enqueue(&op(OperationKind::Update, 1)).await.unwrap();
    let third = store.enqueue(&op(OperationKind::Delete, 2)).await.unwrap();

    let removed = store.clear_queue_through(second).await.unwrap();
    assert_eq!(removed, 2);

    let remaining = store.pending_operations().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].seq, third);
    assert!(first < second);
}

#[tokio::test]
async fn sequence_numbers_are_not_reused_after_clear() {
    let store = make_store();
    let before = store.enqueue(&op(OperationKind::Create, -1)).await.unwrap();
    store.clear_queue().await.unwrap();
    let after = store.enqueue(&op(OperationKind::Create, -2)).await.unwrap();
    assert!(after > before);
}

// ── Availability ─────────────────────────────────────────────────

#[tokio::test]
async fn closed_store_is_unavailable() {
    let store = make_store();
    store.put(Collection::Posts, json!({ "id": 1 })).await.unwrap();
    store.close();

    let err = store.get(Collection::Posts, 1).await.unwrap_err();
    assert!(err.is_unavailable());
    let err = store.enqueue(&op(OperationKind::Create, -1)).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
}

// ── Typed view ───────────────────────────────────────────────────

#[tokio::test]
async fn typed_records_roundtrip() {
    let store: Arc<dyn LocalStore> = make_store();
    let posts: Records<Post> = Records::new(store);

    let mut p = post(7, "hello");
    p.mark(SyncStatus::Pending, None);
    posts.put(&p).await.unwrap();

    let loaded = posts.get(7).await.unwrap().unwrap();
    assert_eq!(loaded, p);
    assert_eq!(posts.count().await.unwrap(), 1);
    assert_eq!(posts.collection(), Collection::Posts);
}

#[tokio::test]
async fn typed_put_requires_id() {
    let store: Arc<dyn LocalStore> = make_store();
    let posts: Records<Post> = Records::new(store);
    let result = posts.put(&Post::new(1, "no id", "")).await;
    assert!(matches!(result, Err(StorageError::InvalidData(_))));
}

#[tokio::test]
async fn typed_bulk_put_and_all() {
    let store: Arc<dyn LocalStore> = make_store();
    let posts: Records<Post> = Records::new(store);
    posts
        .bulk_put(&[post(2, "b"), post(1, "a")])
        .await
        .unwrap();

    let titles: Vec<String> = posts.all().await.unwrap().into_iter().map(|p| p.title).collect();
    assert_eq!(titles, vec!["a", "b"]);
}
