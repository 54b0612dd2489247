//! SQLite implementation of the local store.
//!
//! Each entity collection is a table of `(id, revision, data)` rows where
//! `data` is the record's JSON. The sync queue uses an autoincrement key so
//! sequence numbers are never reused, even after the queue is cleared.

use crate::error::{StorageError, StorageResult};
use crate::store::LocalStore;
use async_trait::async_trait;
use postsync_types::{Collection, QueuedOperation, RecordId, SyncOperation};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY,
        revision INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY,
        revision INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        revision INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sync_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
";

const LAST_LOCAL_ID: &str = "last_local_id";

/// Local store backed by a single SQLite database.
pub struct SqliteStore {
    /// `None` once the store has been closed.
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let store = Self::from_connection(Connection::open(path)?)?;
        info!("Opened local store at {}", path.display());
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Drops the connection. Every later operation fails with
    /// [`StorageError::Unavailable`].
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if guard.take().is_some() {
                info!("Closed local store");
            }
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| StorageError::Unavailable("store is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
    }
}

fn entity_table(collection: Collection) -> StorageResult<&'static str> {
    match collection {
        Collection::Posts => Ok("posts"),
        Collection::Comments => Ok("comments"),
        Collection::Users => Ok("users"),
        Collection::SyncQueue => Err(StorageError::InvalidData(
            "the sync queue is not keyed by record id".to_string(),
        )),
    }
}

/// Extracts the key and revision columns from a record.
fn record_columns(record: &Value) -> StorageResult<(RecordId, i64, String)> {
    let id = record
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| StorageError::InvalidData("record has no integer id".to_string()))?;
    let revision = record.get("revision").and_then(Value::as_u64).unwrap_or(0);
    let revision = i64::try_from(revision)
        .map_err(|_| StorageError::InvalidData(format!("revision {revision} out of range")))?;
    Ok((id, revision, serde_json::to_string(record)?))
}

fn upsert(conn: &Connection, table: &str, record: &Value) -> StorageResult<()> {
    let (id, revision, data) = record_columns(record)?;
    conn.execute(
        &format!(
            "INSERT INTO {table} (id, revision, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET revision = excluded.revision, data = excluded.data"
        ),
        params![id, revision, data],
    )?;
    Ok(())
}

fn stored_revision(conn: &Connection, table: &str, id: RecordId) -> StorageResult<Option<i64>> {
    Ok(conn
        .query_row(
            &format!("SELECT revision FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?)
}

fn as_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidData(format!("{value} out of range")))
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, collection: Collection, id: RecordId) -> StorageResult<Option<Value>> {
        let table = entity_table(collection)?;
        self.with_conn(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    &format!("SELECT data FROM {table} WHERE id = ?1"),
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(|d| serde_json::from_str(&d).map_err(StorageError::from))
                .transpose()
        })
        .await
    }

    async fn get_all(&self, collection: Collection) -> StorageResult<Vec<Value>> {
        let sql = match collection {
            Collection::SyncQueue => "SELECT data FROM sync_queue ORDER BY seq".to_string(),
            other => format!(
                "SELECT data FROM {} ORDER BY id <= 0, abs(id)",
                entity_table(other)?
            ),
        };
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut records = Vec::new();
            for row in rows {
                records.push(serde_json::from_str(&row?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn put(&self, collection: Collection, record: Value) -> StorageResult<()> {
        let table = entity_table(collection)?;
        self.with_conn(move |conn| upsert(conn, table, &record)).await
    }

    async fn delete(&self, collection: Collection, id: RecordId) -> StorageResult<()> {
        let table = entity_table(collection)?;
        self.with_conn(move |conn| {
            conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
            Ok(())
        })
        .await
    }

    async fn bulk_put(&self, collection: Collection, records: Vec<Value>) -> StorageResult<()> {
        let table = entity_table(collection)?;
        let count = records.len();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for record in &records {
                upsert(&tx, table, record)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        debug!("Stored {} records in {}", count, collection);
        Ok(())
    }

    async fn count(&self, collection: Collection) -> StorageResult<usize> {
        let table = match collection {
            Collection::SyncQueue => "sync_queue",
            other => entity_table(other)?,
        };
        self.with_conn(move |conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn allocate_local_id(&self) -> StorageResult<RecordId> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let last: Option<i64> = tx
                .query_row(
                    "SELECT value FROM meta WHERE key = ?1",
                    params![LAST_LOCAL_ID],
                    |row| row.get(0),
                )
                .optional()?;
            let next = last.unwrap_or(0).min(0) - 1;
            tx.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![LAST_LOCAL_ID, next],
            )?;
            tx.commit()?;
            Ok(next)
        })
        .await
    }

    async fn replace_if_revision(
        &self,
        collection: Collection,
        current_id: RecordId,
        expected_revision: u64,
        record: Value,
    ) -> StorageResult<bool> {
        let table = entity_table(collection)?;
        let expected = as_i64(expected_revision)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if stored_revision(&tx, table, current_id)? != Some(expected) {
                return Ok(false);
            }
            let (new_id, _, _) = record_columns(&record)?;
            if new_id != current_id {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE id = ?1"),
                    params![current_id],
                )?;
            }
            upsert(&tx, table, &record)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn delete_if_revision(
        &self,
        collection: Collection,
        id: RecordId,
        expected_revision: u64,
    ) -> StorageResult<bool> {
        let table = entity_table(collection)?;
        let expected = as_i64(expected_revision)?;
        self.with_conn(move |conn| {
            let removed = conn.execute(
                &format!("DELETE FROM {table} WHERE id = ?1 AND revision = ?2"),
                params![id, expected],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn enqueue(&self, operation: &SyncOperation) -> StorageResult<u64> {
        let data = serde_json::to_string(operation)?;
        self.with_conn(move |conn| {
            conn.execute("INSERT INTO sync_queue (data) VALUES (?1)", params![data])?;
            Ok(u64::try_from(conn.last_insert_rowid()).unwrap_or(0))
        })
        .await
    }

    async fn pending_operations(&self) -> StorageResult<Vec<QueuedOperation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT seq, data FROM sync_queue ORDER BY seq")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut operations = Vec::new();
            for row in rows {
                let (seq, data) = row?;
                operations.push(QueuedOperation {
                    seq: u64::try_from(seq).unwrap_or(0),
                    operation: serde_json::from_str(&data)?,
                });
            }
            Ok(operations)
        })
        .await
    }

    async fn clear_queue_through(&self, seq: u64) -> StorageResult<usize> {
        let seq = as_i64(seq)?;
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM sync_queue WHERE seq <= ?1", params![seq])?)
        })
        .await
    }

    async fn clear_queue(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sync_queue", [])?;
            Ok(())
        })
        .await
    }
}
