//! Identity store trait definition.
//!
//! [`IdentityStore`] defines the storage contract for external→internal id
//! mappings and link-table rows. The pipeline writes here only in its
//! `persist` stage, strictly after the remote write has been confirmed.

use rosterline_types::op::{EntityKind, LinkKind};

use crate::error;

/// Result of a batched link-row insert.
///
/// Rows that already existed are counted separately from fresh inserts so
/// callers can distinguish idempotent replays from new work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkInsertOutcome {
    pub inserted: u64,
    pub already_present: u64,
}

/// Storage contract for onboarding identity state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn IdentityStore>`.
pub trait IdentityStore: Send + Sync {
    /// Resolve an external id to its internal id.
    ///
    /// Returns `Ok(None)` when no mapping has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn lookup(&self, kind: EntityKind, external_id: &str) -> error::Result<Option<String>>;

    /// Record a newly-established external→internal mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// when the pair is already mapped, and other variants on storage failure.
    fn insert_mapping(
        &self,
        kind: EntityKind,
        external_id: &str,
        internal_id: &str,
    ) -> error::Result<()>;

    /// Record link rows for `children_internal` under `owner_internal`.
    ///
    /// Duplicate rows are not an error; they are reported in
    /// [`LinkInsertOutcome::already_present`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn insert_links(
        &self,
        link: LinkKind,
        owner_internal: &str,
        children_internal: &[String],
    ) -> error::Result<LinkInsertOutcome>;
}
