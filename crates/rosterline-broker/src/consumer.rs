//! Group consumer with round-robin reads and stale-message reclaim.

use std::sync::Arc;
use std::time::Duration;

use crate::broker::{MessageId, StreamBroker, StreamMessage};
use crate::error;
use crate::stream::{StreamKey, REQUEST_STREAMS};

/// How often (in polls) the consumer attempts a stale-claim pass first.
const RECLAIM_SAMPLING: u64 = 10;

/// One member of a consumer group.
///
/// Each [`poll`](StreamConsumer::poll) reads exactly one request stream,
/// rotating round-robin so a busy stream cannot starve the others. On
/// roughly every tenth poll the consumer first tries to claim messages
/// another member read but never acknowledged (crashed consumers);
/// only if none are claimable does it fall through to a fresh read.
pub struct StreamConsumer {
    broker: Arc<dyn StreamBroker>,
    group: String,
    /// Stable identity within the group across polls.
    name: String,
    stale_after: Duration,
    cursor: usize,
    polls: u64,
}

impl StreamConsumer {
    #[must_use]
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        group: impl Into<String>,
        name: impl Into<String>,
        stale_after: Duration,
    ) -> Self {
        Self {
            broker,
            group: group.into(),
            name: name.into(),
            stale_after,
            cursor: 0,
            polls: 0,
        }
    }

    /// Like [`new`](Self::new), with a random unique consumer name for
    /// hosts that do not carry a stable identity.
    #[must_use]
    pub fn with_generated_name(
        broker: Arc<dyn StreamBroker>,
        group: impl Into<String>,
        stale_after: Duration,
    ) -> Self {
        let name = format!("consumer-{}", uuid::Uuid::new_v4());
        Self::new(broker, group, name, stale_after)
    }

    /// Stable consumer identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the next message, if any.
    ///
    /// Returns `Ok(None)` when neither reclaim nor the polled stream
    /// produced a message; the caller treats that as an explicit idle
    /// condition and decides whether to back off.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`](crate::BrokerError) on transport failure.
    pub fn poll(&mut self) -> error::Result<Option<(StreamKey, StreamMessage)>> {
        let reclaim_turn = self.polls % RECLAIM_SAMPLING == 0;
        self.polls += 1;

        if reclaim_turn {
            if let Some(found) = self.claim_any_stale()? {
                return Ok(Some(found));
            }
        }

        let stream = REQUEST_STREAMS[self.cursor % REQUEST_STREAMS.len()];
        self.cursor = (self.cursor + 1) % REQUEST_STREAMS.len();

        let mut messages = self
            .broker
            .read_new(stream, &self.group, &self.name, 1)?;
        Ok(messages.pop().map(|m| (stream, m)))
    }

    /// Acknowledge a fully-processed message. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`](crate::BrokerError) on transport failure.
    pub fn ack(&self, stream: StreamKey, id: &MessageId) -> error::Result<bool> {
        let settled = self.broker.ack(stream, &self.group, id)?;
        if !settled {
            tracing::debug!(
                stream = stream.as_str(),
                message = id.as_str(),
                "Ack on already-settled message ignored"
            );
        }
        Ok(settled)
    }

    fn claim_any_stale(&self) -> error::Result<Option<(StreamKey, StreamMessage)>> {
        for stream in REQUEST_STREAMS {
            let mut claimed =
                self.broker
                    .claim_stale(stream, &self.group, &self.name, self.stale_after, 1)?;
            if let Some(message) = claimed.pop() {
                tracing::info!(
                    stream = stream.as_str(),
                    message = message.id.as_str(),
                    delivery_count = message.delivery_count,
                    consumer = self.name.as_str(),
                    "Claimed stale message"
                );
                return Ok(Some((stream, message)));
            }
        }
        Ok(None)
    }
}
