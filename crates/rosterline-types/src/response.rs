//! Per-item verdicts returned to the caller.

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;
use crate::error::{ErrorKind, OnboardingError};
use crate::op::EntityKind;

/// Structured error carried by a failed [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub detail: String,
}

/// One verdict for one logical sub-item of a batch.
///
/// Created exactly once per sub-item and immutable after creation.
/// `entity_id` holds the remote-created id on success and the external
/// caller id on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub correlation: CorrelationId,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Successful verdict carrying the remote-created id.
    #[must_use]
    pub fn success(
        correlation: CorrelationId,
        entity_kind: EntityKind,
        internal_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation,
            entity_kind,
            entity_id: internal_id.into(),
            success: true,
            error: None,
        }
    }

    /// Failed verdict carrying the external caller id and the typed error.
    #[must_use]
    pub fn failure(
        correlation: CorrelationId,
        entity_kind: EntityKind,
        external_id: impl Into<String>,
        error: &OnboardingError,
    ) -> Self {
        Self {
            correlation,
            entity_kind,
            entity_id: external_id.into(),
            success: false,
            error: Some(ResponseError {
                kind: error.kind,
                detail: error.to_string(),
            }),
        }
    }

    /// The error kind, for failed responses.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
