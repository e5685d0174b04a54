//! Named streams and operation routing.

use rosterline_types::op::OperationType;
use serde::{Deserialize, Serialize};

/// The fixed set of named streams the transport uses: one per creation
/// entity type, one for link operations, and two terminal side streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKey {
    Organizations,
    Schools,
    Classes,
    Users,
    Links,
    Completed,
    Failed,
}

/// Streams carrying inbound requests, in round-robin consumption order.
pub const REQUEST_STREAMS: [StreamKey; 5] = [
    StreamKey::Organizations,
    StreamKey::Schools,
    StreamKey::Classes,
    StreamKey::Users,
    StreamKey::Links,
];

impl StreamKey {
    /// Broker-side stream name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organizations => "roster:organizations",
            Self::Schools => "roster:schools",
            Self::Classes => "roster:classes",
            Self::Users => "roster:users",
            Self::Links => "roster:links",
            Self::Completed => "roster:completed",
            Self::Failed => "roster:failed",
        }
    }

    /// The stream an operation's requests are appended to.
    #[must_use]
    pub fn for_operation(op: OperationType) -> Self {
        match op {
            OperationType::CreateOrganization => Self::Organizations,
            OperationType::CreateSchool => Self::Schools,
            OperationType::CreateClass => Self::Classes,
            OperationType::CreateUser => Self::Users,
            _ => Self::Links,
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
