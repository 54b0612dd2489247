//! Local store for postsync.
//!
//! Provides durable storage for the three entity collections (posts,
//! comments, users) and the sync queue.
//!
//! # Architecture
//!
//! - [`LocalStore`] is the async boundary the sync engine talks to. Records
//!   cross it as JSON objects keyed by their `id` field.
//! - [`SqliteStore`] implements it on SQLite, one table per collection plus
//!   an auto-sequenced `sync_queue` table. Blocking SQLite calls run on
//!   tokio's blocking pool.
//! - [`Records`] is a typed view over one collection for any
//!   [`postsync_types::Record`].
//!
//! Every operation fails with [`StorageError::Unavailable`] once the store
//! has been closed; callers treat that as retryable.

mod error;
mod sqlite;
mod store;
mod typed;

pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteStore;
pub use store::LocalStore;
pub use typed::Records;
