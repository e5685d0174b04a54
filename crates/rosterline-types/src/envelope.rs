//! Broker payload envelopes.
//!
//! [`StreamEnvelope`] wraps one original request plus a retry counter for
//! transport on an operation stream. [`OutcomeEnvelope`] carries one
//! terminal [`Response`] on the completed or failed stream.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::request::RawRequest;
use crate::response::Response;

/// ISO-8601 formatted timestamp string.
///
/// Thin wrapper providing type clarity without format validation; callers
/// are trusted to provide valid ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Create a new timestamp from an ISO-8601 string.
    #[must_use]
    pub fn new(iso8601: impl Into<String>) -> Self {
        Self(iso8601.into())
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Envelope wrapping one original request for broker transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    /// The original request, re-classified on consumption.
    pub request: RawRequest,
    /// Number of prior processing attempts for this request.
    pub attempt: u32,
    pub enqueued_at: Timestamp,
}

/// Envelope wrapping one terminal verdict for the completed/failed streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEnvelope {
    pub response: Response,
    pub completed_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CreateEntityPayload, RawRequest};

    #[test]
    fn timestamp_transparent_serde() {
        let ts = Timestamp::new("2026-08-23T10:30:00Z");
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-08-23T10:30:00Z\"");
    }

    #[test]
    fn stream_envelope_roundtrip() {
        let env = StreamEnvelope {
            request: RawRequest {
                request_id: "r1".into(),
                sequence: 0,
                create_organization: Some(CreateEntityPayload {
                    external_id: "org-1".into(),
                    name: "District 9".into(),
                    parent_external_id: None,
                }),
                ..RawRequest::default()
            },
            attempt: 1,
            enqueued_at: Timestamp::new("2026-08-23T10:30:00Z"),
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: StreamEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
        assert_eq!(back.attempt, 1);
    }
}
