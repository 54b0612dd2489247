//! Offline-first sync engine for posts, comments and users.
//!
//! Every read and write goes through an [`EntityService`], which talks to
//! the remote API when the device is online and falls back to the local
//! store when it is not. Writes that could not reach the remote are kept
//! locally with a sync status and replayed later by the
//! [`SyncCoordinator`].
//!
//! ## Components
//!
//! - **Connectivity**: process-wide online flag with change subscriptions
//! - **Remote**: request/response gateway to the REST API
//! - **Service**: per-entity offline-first reads and writes
//! - **Coordinator**: reconciliation passes and bulk refresh
//! - **Engine**: wires everything together and owns background tasks
//!
//! # Example
//!
//! ```no_run
//! use postsync_storage::SqliteStore;
//! use postsync_sync::{SyncConfig, SyncEngine};
//! use postsync_types::Post;
//! use std::sync::Arc;
//!
//! # async fn run() -> postsync_sync::SyncResult<()> {
//! let store = Arc::new(SqliteStore::open("postsync.db")?);
//! let engine = SyncEngine::with_http(SyncConfig::default(), store, true)?;
//!
//! let post = engine.posts().create(Post::new(1, "Hello", "World")).await?;
//! println!("{:?} is {}", post.id, post.meta.sync_status);
//! # Ok(())
//! # }
//! ```

mod comments;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod details;
mod engine;
mod error;
pub mod notify;
pub mod remote;
mod service;

pub use config::{RemoteConfig, SyncConfig};
pub use connectivity::{
    spawn_probe, ConnectivityMonitor, ConnectivityProbe, ConnectivitySubscription, HttpProbe,
};
pub use coordinator::{
    remote_wins, CollectionStatus, RecordOutcome, RefreshOutcome, RefreshReport, ReplayAction,
    ReplayResult, StatusSummary, SyncCoordinator, SyncReport,
};
pub use details::PostViews;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use notify::{Notification, Notifier, Severity};
pub use remote::{HttpGateway, Page, RemoteGateway};
pub use service::EntityService;
