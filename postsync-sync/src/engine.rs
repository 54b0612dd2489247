//! Sync engine facade.
//!
//! Wires the local store, remote gateway, connectivity monitor, entity
//! services and coordinator together, and owns the background tasks.

use crate::config::SyncConfig;
use crate::connectivity::{spawn_probe, ConnectivityMonitor, ConnectivityProbe};
use crate::coordinator::{RefreshReport, StatusSummary, SyncCoordinator, SyncReport};
use crate::details::PostViews;
use crate::error::SyncResult;
use crate::notify::{Notification, Notifier};
use crate::remote::{HttpGateway, RemoteGateway};
use crate::service::EntityService;
use postsync_storage::LocalStore;
use postsync_types::{Comment, EnhancedPost, Post, PostDetails, RecordId, User};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Offline-first sync engine.
pub struct SyncEngine {
    config: SyncConfig,
    connectivity: ConnectivityMonitor,
    notifier: Notifier,
    posts: EntityService<Post>,
    comments: EntityService<Comment>,
    users: EntityService<User>,
    views: PostViews,
    coordinator: Arc<SyncCoordinator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteGateway>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let notifier = Notifier::default();
        let posts = EntityService::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            connectivity.clone(),
            &config,
        );
        let comments = EntityService::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            connectivity.clone(),
            &config,
        );
        let users = EntityService::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            connectivity.clone(),
            &config,
        );
        let views = PostViews::new(posts.clone(), comments.clone(), users.clone());
        let coordinator = Arc::new(SyncCoordinator::new(
            store,
            remote,
            connectivity.clone(),
            notifier.clone(),
            config.max_concurrent_replays,
        ));

        Self {
            config,
            connectivity,
            notifier,
            posts,
            comments,
            users,
            views,
            coordinator,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Builds an engine talking to the configured HTTP API.
    pub fn with_http(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        initially_online: bool,
    ) -> SyncResult<Self> {
        let remote = Arc::new(HttpGateway::new(&config.remote)?);
        info!("Using remote API at {}", remote.base_url());
        Ok(Self::new(
            config,
            store,
            remote,
            ConnectivityMonitor::new(initially_online),
        ))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn posts(&self) -> &EntityService<Post> {
        &self.posts
    }

    pub fn comments(&self) -> &EntityService<Comment> {
        &self.comments
    }

    pub fn users(&self) -> &EntityService<User> {
        &self.users
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn sync_in_progress(&self) -> watch::Receiver<bool> {
        self.coordinator.sync_in_progress()
    }

    /// Runs one reconciliation pass now.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        self.coordinator.reconcile().await
    }

    /// Pulls every collection from the remote.
    pub async fn refresh(&self) -> RefreshReport {
        self.coordinator.refresh().await
    }

    pub async fn status(&self) -> SyncResult<StatusSummary> {
        self.coordinator.status().await
    }

    pub async fn post_details(&self, post_id: RecordId) -> SyncResult<PostDetails> {
        self.views.post_details(post_id).await
    }

    /// A page of posts with author names and comment counts.
    pub async fn enhanced_posts(&self, start: usize, limit: usize) -> SyncResult<Vec<EnhancedPost>> {
        let posts = self.posts.list_page(start, limit).await?;
        self.views.enrich(posts).await
    }

    /// Reconciles automatically whenever connectivity comes back.
    pub fn start_auto_sync(&self) {
        let handle = self.coordinator.spawn_auto_sync();
        self.track(handle);
    }

    /// Polls `probe` at the configured interval to drive connectivity.
    pub fn start_probe(&self, probe: Arc<dyn ConnectivityProbe>) {
        let interval = Duration::from_secs(self.config.probe_interval_secs.max(1));
        let handle = spawn_probe(self.connectivity.clone(), probe, interval);
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(handle),
            Err(_) => handle.abort(),
        }
    }

    /// Stops background tasks. In-flight passes finish on their own.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
