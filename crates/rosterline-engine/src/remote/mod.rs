//! Boundary to the authoritative admin service.
//!
//! [`AdminGateway`] is the only seam through which entities are created
//! or linked remotely. Pipelines depend on the trait; the HTTP client
//! lives in [`http`] and tests substitute programmable fakes.

pub mod http;

use async_trait::async_trait;

use rosterline_types::op::{EntityKind, LinkKind};

pub use http::UreqAdminGateway;

/// One (owner, child) pair the remote side rejected as already linked.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPair {
    pub owner_id: String,
    pub child_id: String,
}

/// Remote-call failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// A bulk link write hit idempotency conflicts. The write as a whole
    /// was not applied; the listed pairs already exist remotely.
    #[error("bulk write rejected: {} pair(s) already linked", pairs.len())]
    DuplicateConflict { pairs: Vec<ConflictPair> },
    /// The call exceeded its deadline.
    #[error("remote call timed out")]
    Timeout,
    /// Connection-level failure before a response was read.
    #[error("remote transport failure: {0}")]
    Transport(String),
    /// The remote answered with a shape or status we cannot interpret.
    #[error("remote protocol violation: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// True when re-issuing the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

/// One entity in a bulk create call.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCreateRequest {
    pub external_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_internal_id: Option<String>,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Per-item verdict of a bulk create call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RemoteCreateStatus {
    /// Newly created; `internal_id` is the authoritative id.
    Created { internal_id: String },
    /// The external id was already onboarded. The remote may or may not
    /// echo the existing internal id.
    AlreadyExists { internal_id: Option<String> },
    /// The remote refused the item.
    Rejected { message: String },
}

/// Bulk create verdict attributed back to its external id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCreateResult {
    pub external_id: String,
    #[serde(flatten)]
    pub status: RemoteCreateStatus,
}

/// Client for the authoritative admin service.
#[async_trait]
pub trait AdminGateway: Send + Sync {
    /// Create a batch of same-kind entities, returning one result per item.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the call as a whole failed; per-item
    /// rejections come back inside the result vector.
    async fn bulk_create(
        &self,
        kind: EntityKind,
        items: Vec<RemoteCreateRequest>,
    ) -> Result<Vec<RemoteCreateResult>, RemoteError>;

    /// Attach `children_internal` to the owner in one bulk write.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::DuplicateConflict`] when any pair already
    /// exists; the write is all-or-nothing and none of the pairs were
    /// applied in that case.
    async fn write_links(
        &self,
        link: LinkKind,
        owner_internal: &str,
        children_internal: &[String],
    ) -> Result<(), RemoteError>;
}
