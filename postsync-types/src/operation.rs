//! Queued sync operations.
//!
//! The sync queue is an append-only log of mutations recorded locally while
//! the remote could not confirm them. Entries are auto-sequenced by the
//! store and drained in sequence order.

use crate::record::EntityKind;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The mutation a queued operation stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intended remote mutation not yet confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub entity_type: EntityKind,
    /// Snapshot of the record at the time of the mutation.
    pub data: serde_json::Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SyncOperation {
    /// Creates an operation stamped with the current time.
    #[must_use]
    pub fn new(kind: OperationKind, entity_type: EntityKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            entity_type,
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// The id of the record this operation targets, if the snapshot has one.
    #[must_use]
    pub fn record_id(&self) -> Option<i64> {
        self.data.get("id").and_then(serde_json::Value::as_i64)
    }
}

/// A sync operation together with its queue sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub seq: u64,
    pub operation: SyncOperation,
}
