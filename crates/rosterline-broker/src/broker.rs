//! Stream broker trait definition.
//!
//! The contract models consumer-group stream semantics: appends are
//! durable, reads within a group deliver each message to exactly one
//! member, and a read-but-unacknowledged message becomes claimable by
//! another member once it has been idle past a threshold. Messages are
//! never removed on read alone.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error;
use crate::stream::StreamKey;

/// Broker-assigned message identifier, used for acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new message id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: MessageId,
    /// Serialized envelope payload.
    pub payload: String,
    /// How many times this message has been delivered, including this one.
    pub delivery_count: u32,
}

/// Behavioral contract for the message transport.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StreamBroker>`.
pub trait StreamBroker: Send + Sync {
    /// Append a payload to a stream, returning the broker-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`](crate::BrokerError::Unavailable)
    /// on transport failure; callers retry, never drop.
    fn append(&self, stream: StreamKey, payload: &str) -> error::Result<MessageId>;

    /// Read up to `max` fresh messages for a consumer within a group.
    ///
    /// An empty result is the explicit no-messages condition, not an
    /// error. The group is created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`](crate::BrokerError) on transport failure.
    fn read_new(
        &self,
        stream: StreamKey,
        group: &str,
        consumer: &str,
        max: usize,
    ) -> error::Result<Vec<StreamMessage>>;

    /// Claim up to `max` messages delivered to some group member but left
    /// unacknowledged for at least `min_idle`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`](crate::BrokerError) on transport failure.
    fn claim_stale(
        &self,
        stream: StreamKey,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> error::Result<Vec<StreamMessage>>;

    /// Acknowledge a delivered message.
    ///
    /// Returns `true` if the message was pending and is now settled,
    /// `false` if it was already acknowledged or unknown. Acking twice
    /// is a no-op, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`](crate::BrokerError) on transport failure.
    fn ack(&self, stream: StreamKey, group: &str, id: &MessageId) -> error::Result<bool>;
}
