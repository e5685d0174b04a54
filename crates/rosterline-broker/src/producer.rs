//! Request/outcome producer with bounded append retry.

use std::sync::Arc;
use std::time::Duration;

use rosterline_types::envelope::{OutcomeEnvelope, StreamEnvelope, Timestamp};
use rosterline_types::request::RawRequest;
use rosterline_types::response::Response;

use crate::broker::{MessageId, StreamBroker};
use crate::error::{self, BrokerError};
use crate::stream::StreamKey;

const APPEND_BACKOFF_BASE_MS: u64 = 100;
const APPEND_BACKOFF_MAX_MS: u64 = 5_000;

/// Appends request envelopes to their operation stream and terminal
/// verdicts to the completed/failed side streams.
///
/// Append failures are retried with exponential backoff up to the
/// configured attempt limit and surfaced as errors after that; a message
/// is never silently dropped.
pub struct RequestProducer {
    broker: Arc<dyn StreamBroker>,
    max_attempts: u32,
}

impl RequestProducer {
    #[must_use]
    pub fn new(broker: Arc<dyn StreamBroker>, max_attempts: u32) -> Self {
        Self {
            broker,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Enqueue one raw request on the stream for its operation type.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] for an unclassifiable request's
    /// missing route (the caller validates first), and broker failures
    /// once retries are exhausted.
    pub async fn enqueue(&self, request: &RawRequest, attempt: u32) -> error::Result<MessageId> {
        let Some(op) = request.operation() else {
            return Err(BrokerError::Unavailable(format!(
                "request {} has no classifiable operation",
                request.correlation()
            )));
        };
        let stream = StreamKey::for_operation(op);
        let envelope = StreamEnvelope {
            request: request.clone(),
            attempt,
            enqueued_at: now(),
        };
        let payload = serde_json::to_string(&envelope)?;
        self.append_with_retry(stream, &payload).await
    }

    /// Publish one terminal verdict to the completed or failed stream.
    ///
    /// # Errors
    ///
    /// Returns the final [`BrokerError`] once retries are exhausted.
    pub async fn publish_outcome(&self, response: &Response) -> error::Result<MessageId> {
        let stream = if response.success {
            StreamKey::Completed
        } else {
            StreamKey::Failed
        };
        let envelope = OutcomeEnvelope {
            response: response.clone(),
            completed_at: now(),
        };
        let payload = serde_json::to_string(&envelope)?;
        self.append_with_retry(stream, &payload).await
    }

    async fn append_with_retry(&self, stream: StreamKey, payload: &str) -> error::Result<MessageId> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.broker.append(stream, payload) {
                Ok(id) => return Ok(id),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = append_backoff(attempt);
                    tracing::warn!(
                        stream = stream.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Broker append failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        stream = stream.as_str(),
                        attempt,
                        error = %e,
                        "Broker append failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

fn now() -> Timestamp {
    Timestamp::new(chrono::Utc::now().to_rfc3339())
}

/// Exponential backoff for append retries, capped.
fn append_backoff(attempt: u32) -> Duration {
    let delay_ms = APPEND_BACKOFF_BASE_MS.saturating_mul(2u64.pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(APPEND_BACKOFF_MAX_MS))
}
