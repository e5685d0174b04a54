//! Identity store error types.

use rosterline_types::op::EntityKind;

/// Errors produced by [`IdentityStore`](crate::IdentityStore) operations.
///
/// `AlreadyExists` and `NotFound` are distinct variants rather than folded
/// into a generic failure because the pipeline branches on them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("identity store lock poisoned")]
    LockPoisoned,

    /// A mapping for this (kind, external id) pair is already recorded.
    #[error("{kind} mapping already exists for external id {external_id}")]
    AlreadyExists {
        kind: EntityKind,
        external_id: String,
    },

    /// No mapping recorded for this (kind, external id) pair.
    #[error("{kind} not found for external id {external_id}")]
    NotFound {
        kind: EntityKind,
        external_id: String,
    },
}

impl StoreError {
    /// Returns `true` for the benign idempotency conflict.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
