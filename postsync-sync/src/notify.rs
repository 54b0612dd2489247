//! User-facing notifications.
//!
//! Connectivity loss is informational; replay failures are errors the
//! user should see. Delivery is best effort: with no subscribers a
//! notification is dropped.

use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// How prominently a notification should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BackOnline,
    Offline,
    /// A reconciliation pass confirmed local changes with the remote.
    SyncCompleted { synced: usize, purged: usize },
    /// Some records could not be replayed and stay visible as failed.
    SyncFailures { failed: usize },
    /// A pass could not run at all.
    SyncError(String),
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Self::SyncFailures { .. } | Self::SyncError(_) => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackOnline => write!(f, "Back online"),
            Self::Offline => write!(f, "Offline mode"),
            Self::SyncCompleted { synced, purged } => {
                write!(f, "Synced {synced} changes, removed {purged} records")
            }
            Self::SyncFailures { failed } => write!(f, "{failed} changes could not be synced"),
            Self::SyncError(message) => write!(f, "Sync failed: {message}"),
        }
    }
}

/// Fan-out channel for [`Notification`]s.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn notify(&self, notification: Notification) {
        debug!("Notification: {}", notification);
        if self.tx.send(notification).is_err() {
            debug!("No notification subscribers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
