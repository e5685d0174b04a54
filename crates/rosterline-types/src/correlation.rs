//! Caller-supplied correlation identifiers.
//!
//! A [`CorrelationId`] exists only to match a [`Response`](crate::response::Response)
//! back to the request that produced it. It carries no semantic meaning and
//! is never used for deduplication decisions.

use serde::{Deserialize, Serialize};

/// Opaque (id, sequence) pair supplied by the caller on every request.
///
/// One caller-level id may carry many sequence numbers within a batch, so
/// the pair is the unit of response matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId {
    /// Caller-assigned request identifier.
    pub id: String,
    /// Position of this item within the caller's submission.
    pub seq: u32,
}

impl CorrelationId {
    /// Create a new correlation id.
    #[must_use]
    pub fn new(id: impl Into<String>, seq: u32) -> Self {
        Self { id: id.into(), seq }
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.id, self.seq)
    }
}
