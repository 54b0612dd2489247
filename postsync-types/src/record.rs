//! Sync metadata and the `Record` trait.
//!
//! Every entity persisted locally carries a [`SyncMeta`] block describing
//! how its current form relates to the remote copy. The sync engine only
//! talks to entities through [`Record`], so posts, comments and users share
//! one implementation of the offline-first logic.

use crate::ids::{is_provisional, RecordId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JSON keys owned by the sync layer. Stripped before a record is sent to
/// the remote API.
pub const SYNC_META_FIELDS: [&str; 3] = ["syncStatus", "syncError", "revision"];

/// How the local form of a record relates to the remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// Confirmed by the remote in its current form.
    #[default]
    Synced,
    /// Written locally, never sent (or sent and not answered).
    Pending,
    /// Sent to the remote and rejected.
    Failed,
    /// Deleted locally; the remote delete has not been confirmed.
    DeletePending,
    /// The remote delete was attempted and failed.
    DeleteFailed,
}

impl SyncStatus {
    /// Returns the wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::DeletePending => "delete-pending",
            Self::DeleteFailed => "delete-failed",
        }
    }

    /// Returns true for every status other than `Synced`.
    #[must_use]
    pub const fn is_unsettled(&self) -> bool {
        !matches!(self, Self::Synced)
    }

    /// Returns true if the record is a tombstone awaiting remote deletion.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        matches!(self, Self::DeletePending | Self::DeleteFailed)
    }

    /// All statuses, in lifecycle order.
    pub const ALL: [SyncStatus; 5] = [
        Self::Synced,
        Self::Pending,
        Self::Failed,
        Self::DeletePending,
        Self::DeleteFailed,
    ];
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Unknown {
                what: "sync status",
                value: s.to_string(),
            })
    }
}

/// Sync metadata flattened into every entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    /// Local mutation counter. Bumped on every local write so that a
    /// reconciliation result never overwrites a newer local edit.
    #[serde(default)]
    pub revision: u64,
}

/// The three entity kinds handled by the sync layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Comment,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Post, Self::Comment, Self::User];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::User => "user",
        }
    }

    /// Local collection holding records of this kind.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Post => Collection::Posts,
            Self::Comment => Collection::Comments,
            Self::User => Collection::Users,
        }
    }

    /// Remote resource path segment (`/posts`, `/comments`, `/users`).
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Comment => "comments",
            Self::User => "users",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Unknown {
                what: "entity kind",
                value: s.to_string(),
            })
    }
}

/// The four local collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Posts,
    Comments,
    Users,
    SyncQueue,
}

impl Collection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Users => "users",
            Self::SyncQueue => "syncQueue",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity the sync layer can persist, replay and reconcile.
pub trait Record:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// The entity kind, which also selects collection and endpoint.
    const KIND: EntityKind;

    fn id(&self) -> Option<RecordId>;

    fn set_id(&mut self, id: RecordId);

    fn meta(&self) -> &SyncMeta;

    fn meta_mut(&mut self) -> &mut SyncMeta;

    /// Last modification time, when the entity kind tracks one.
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn sync_status(&self) -> SyncStatus {
        self.meta().sync_status
    }

    fn revision(&self) -> u64 {
        self.meta().revision
    }

    /// Sets the sync status; `error` replaces any previous sync error.
    fn mark(&mut self, status: SyncStatus, error: Option<String>) {
        let meta = self.meta_mut();
        meta.sync_status = status;
        meta.sync_error = error;
    }

    /// Returns true if the record has an id the remote assigned.
    fn has_remote_id(&self) -> bool {
        self.id().is_some_and(|id| !is_provisional(id))
    }

    /// The record this one hangs off, as `(kind, id)`.
    fn parent(&self) -> Option<(EntityKind, RecordId)> {
        None
    }

    /// Re-points the record after its parent moved to a new id.
    fn set_parent_id(&mut self, _id: RecordId) {}

    /// The parent's id when the remote has not assigned one yet. Such a
    /// record cannot be sent to the remote before its parent.
    fn provisional_parent(&self) -> Option<(EntityKind, RecordId)> {
        self.parent().filter(|(_, id)| is_provisional(*id))
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// JSON body for the remote API: sync metadata removed, provisional ids
    /// dropped so the server assigns its own.
    fn remote_payload(&self) -> Result<serde_json::Value> {
        let mut value = self.to_json()?;
        if let Some(object) = value.as_object_mut() {
            for field in SYNC_META_FIELDS {
                object.remove(field);
            }
            if !self.has_remote_id() {
                object.remove("id");
            }
        }
        Ok(value)
    }
}
