//! Connectivity monitoring.
//!
//! The monitor holds the current online flag and broadcasts transitions to
//! subscribers. Setting the flag to the value it already holds is a no-op,
//! so subscribers only ever observe real transitions. A slow subscriber
//! may see several quick transitions coalesced into the latest value.
//!
//! Something has to feed the monitor: the host platform via
//! [`ConnectivityMonitor::set_online`], or a [`ConnectivityProbe`] driven
//! by [`spawn_probe`].

use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shared online/offline signal.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Current connectivity.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the platform's connectivity. Returns whether this was a
    /// transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    /// Subscribes to transitions after this point.
    pub fn subscribe(&self) -> ConnectivitySubscription {
        ConnectivitySubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// A stream of connectivity transitions.
pub struct ConnectivitySubscription {
    rx: watch::Receiver<bool>,
}

impl ConnectivitySubscription {
    /// The value as of the last observed transition.
    pub fn current(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the next transition and returns the new value, or `None`
    /// once every monitor handle is gone.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Something that can tell whether the remote is reachable.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Probes the API base URL. Any HTTP response counts as reachable.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &RemoteConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.clamp(1, 10)))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

/// Runs `probe` every `interval` and feeds the result into `monitor`
/// until the returned task is aborted.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = probe.probe().await;
            monitor.set_online(online);
        }
    })
}
