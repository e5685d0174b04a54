//! Broker-driven batch consumption.
//!
//! One [`BatchConsumer`] ties a group consumer, the orchestrator, and an
//! outcome producer together: poll a message, process its request,
//! publish every verdict, then acknowledge. Acknowledgement comes last,
//! so a crash mid-processing leaves the message claimable by another
//! group member and the run is repeated rather than lost.

use std::sync::Arc;

use anyhow::Context;

use rosterline_broker::{RequestProducer, StreamConsumer};
use rosterline_types::envelope::StreamEnvelope;

use crate::errors::PipelineError;
use crate::orchestrator::Orchestrator;

/// What one poll produced.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// A message was processed and acknowledged.
    Processed { verdicts: usize },
    /// No stream had anything to read.
    Idle,
}

/// Consumes request streams and drives the orchestrator.
pub struct BatchConsumer {
    consumer: StreamConsumer,
    producer: RequestProducer,
    orchestrator: Arc<Orchestrator>,
}

impl BatchConsumer {
    #[must_use]
    pub fn new(
        consumer: StreamConsumer,
        producer: RequestProducer,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            consumer,
            producer,
            orchestrator,
        }
    }

    /// Poll one message and process it end to end.
    ///
    /// A payload that does not decode is acknowledged and dropped with an
    /// error log; redelivering it could never succeed. Failure to publish
    /// a verdict leaves the message unacknowledged for another attempt.
    ///
    /// # Errors
    ///
    /// Returns an error on broker transport failure.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, PipelineError> {
        let Some((stream, message)) = self
            .consumer
            .poll()
            .context("broker poll failed")?
        else {
            return Ok(PollOutcome::Idle);
        };

        let envelope: StreamEnvelope = match serde_json::from_str(&message.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(
                    stream = stream.as_str(),
                    message = message.id.as_str(),
                    error = %err,
                    "Dropping undecodable message"
                );
                self.consumer
                    .ack(stream, &message.id)
                    .context("ack of undecodable message failed")?;
                return Ok(PollOutcome::Processed { verdicts: 0 });
            }
        };

        tracing::info!(
            stream = stream.as_str(),
            message = message.id.as_str(),
            correlation = %envelope.request.correlation(),
            attempt = envelope.attempt,
            delivery_count = message.delivery_count,
            "Processing message"
        );

        let outcome = self
            .orchestrator
            .process_batch(vec![envelope.request])
            .await;
        let verdicts = outcome.responses.len();
        for response in &outcome.responses {
            self.producer
                .publish_outcome(response)
                .await
                .context("verdict publish failed")?;
        }

        self.consumer
            .ack(stream, &message.id)
            .context("ack failed")?;
        Ok(PollOutcome::Processed { verdicts })
    }

    /// Poll until every stream is idle. Used by the CLI and tests; a
    /// long-running worker loops [`poll_once`](Self::poll_once) itself
    /// with its own backoff.
    ///
    /// # Errors
    ///
    /// Returns the first transport error encountered.
    pub async fn drain(&mut self) -> Result<usize, PipelineError> {
        let mut total = 0;
        let mut idle_polls = 0;
        // One idle rotation across every request stream means empty.
        while idle_polls < rosterline_broker::REQUEST_STREAMS.len() + 1 {
            match self.poll_once().await? {
                PollOutcome::Processed { verdicts } => {
                    total += verdicts;
                    idle_polls = 0;
                }
                PollOutcome::Idle => idle_polls += 1,
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rosterline_broker::{InMemoryBroker, StreamBroker, StreamKey};
    use rosterline_state::SqliteIdentityStore;
    use rosterline_types::op::{EntityKind, LinkKind};
    use rosterline_types::request::{CreateEntityPayload, RawRequest};

    use crate::config::EngineConfig;
    use crate::remote::{
        AdminGateway, RemoteCreateRequest, RemoteCreateResult, RemoteCreateStatus, RemoteError,
    };

    struct AutoGateway {
        next: Mutex<u32>,
    }

    #[async_trait]
    impl AdminGateway for AutoGateway {
        async fn bulk_create(
            &self,
            kind: EntityKind,
            items: Vec<RemoteCreateRequest>,
        ) -> Result<Vec<RemoteCreateResult>, RemoteError> {
            let mut next = self.next.lock().unwrap();
            Ok(items
                .into_iter()
                .map(|item| {
                    *next += 1;
                    RemoteCreateResult {
                        external_id: item.external_id,
                        status: RemoteCreateStatus::Created {
                            internal_id: format!("{}_{}", kind.as_str(), *next),
                        },
                    }
                })
                .collect())
        }

        async fn write_links(
            &self,
            _link: LinkKind,
            _owner_internal: &str,
            _children_internal: &[String],
        ) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn batch_consumer(broker: &Arc<InMemoryBroker>) -> BatchConsumer {
        let store = Arc::new(SqliteIdentityStore::in_memory().unwrap());
        let gateway = Arc::new(AutoGateway {
            next: Mutex::new(0),
        });
        let orchestrator = Arc::new(Orchestrator::new(
            store,
            gateway,
            EngineConfig::default(),
        ));
        BatchConsumer::new(
            StreamConsumer::new(
                broker.clone() as Arc<dyn StreamBroker>,
                "onboard",
                "c1",
                Duration::from_secs(60),
            ),
            RequestProducer::new(broker.clone() as Arc<dyn StreamBroker>, 3),
            orchestrator,
        )
    }

    fn org_request(request_id: &str) -> RawRequest {
        RawRequest {
            request_id: request_id.into(),
            create_organization: Some(CreateEntityPayload {
                external_id: "org-1".into(),
                name: "District".into(),
                parent_external_id: None,
            }),
            ..RawRequest::default()
        }
    }

    #[tokio::test]
    async fn processed_message_publishes_verdict_and_acks() {
        let broker = Arc::new(InMemoryBroker::new());
        let producer = RequestProducer::new(broker.clone() as Arc<dyn StreamBroker>, 3);
        producer.enqueue(&org_request("r1"), 0).await.unwrap();

        let mut consumer = batch_consumer(&broker);
        let processed = consumer.drain().await.unwrap();

        assert_eq!(processed, 1);
        assert_eq!(broker.stream_len(StreamKey::Completed).unwrap(), 1);
        assert_eq!(broker.pending_len(StreamKey::Organizations, "onboard").unwrap(), 0);
    }

    #[tokio::test]
    async fn undecodable_payload_is_acked_and_dropped() {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .append(StreamKey::Organizations, "not json")
            .unwrap();

        let mut consumer = batch_consumer(&broker);
        let processed = consumer.drain().await.unwrap();

        assert_eq!(processed, 0);
        assert_eq!(broker.stream_len(StreamKey::Completed).unwrap(), 0);
        assert_eq!(broker.pending_len(StreamKey::Organizations, "onboard").unwrap(), 0);
    }

    #[tokio::test]
    async fn idle_broker_reports_idle() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut consumer = batch_consumer(&broker);
        assert_eq!(consumer.poll_once().await.unwrap(), PollOutcome::Idle);
    }
}
