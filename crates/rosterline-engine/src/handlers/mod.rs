//! Per-operation pipeline implementations.
//!
//! [`create::CreatePipeline`] covers the four entity creations,
//! [`link::LinkPipeline`] the seven associations. Both are generic over
//! the operation type they are constructed for; the orchestrator builds
//! one per bucket.

pub mod create;
pub mod link;

pub use create::CreatePipeline;
pub use link::LinkPipeline;

/// Maximum entity name length accepted at validation.
pub(crate) const MAX_NAME_LEN: usize = 256;
