//! Record identifiers.
//!
//! Ids are assigned by the remote API and are strictly positive. Records
//! created locally before the remote has seen them are stored under a
//! provisional id (zero or negative) handed out by the local store.

/// Identifier of a post, comment or user.
pub type RecordId = i64;

/// Returns true if `id` was allocated locally and never confirmed remotely.
#[must_use]
pub const fn is_provisional(id: RecordId) -> bool {
    id <= 0
}

/// Returns true if `id` was assigned by the remote API.
#[must_use]
pub const fn is_remote(id: RecordId) -> bool {
    id > 0
}
