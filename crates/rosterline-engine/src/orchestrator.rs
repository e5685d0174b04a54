//! Batch entry point: classify, replay buckets in order, aggregate
//! verdicts.

use std::sync::Arc;

use rosterline_state::IdentityStore;
use rosterline_types::op::OperationType;
use rosterline_types::request::RawRequest;
use rosterline_types::response::Response;

use crate::cache::ResolveCache;
use crate::config::EngineConfig;
use crate::handlers::{CreatePipeline, LinkPipeline};
use crate::pipeline::compose;
use crate::remote::AdminGateway;
use crate::scheduler;

/// Every verdict produced by one batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub responses: Vec<Response>,
}

impl BatchOutcome {
    /// Number of successful verdicts.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.responses.iter().filter(|r| r.success).count()
    }

    /// Number of failed verdicts.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.responses.len() - self.succeeded()
    }
}

/// Owns the collaborators and drives batches end to end.
pub struct Orchestrator {
    store: Arc<dyn IdentityStore>,
    cache: Arc<ResolveCache>,
    gateway: Arc<dyn AdminGateway>,
    config: EngineConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        gateway: Arc<dyn AdminGateway>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(ResolveCache::new(config.cache_ttl()));
        Self {
            store,
            cache,
            gateway,
            config,
        }
    }

    /// Process one batch: classify, replay non-empty buckets in execution
    /// order, and return one verdict per logical sub-item.
    pub async fn process_batch(&self, batch: Vec<RawRequest>) -> BatchOutcome {
        let total = batch.len();
        let mut plan = scheduler::classify_batch(batch);
        let mut responses = plan.take_invalid();

        tracing::info!(
            items = total,
            classified = plan.classified_len(),
            invalid = responses.len(),
            "Processing batch"
        );

        while let Some((op, items)) = plan.next_bucket() {
            let bucket_len = items.len();
            let bucket_responses = self.run_bucket(op, items).await;
            tracing::debug!(
                op = op.as_str(),
                items = bucket_len,
                verdicts = bucket_responses.len(),
                "Bucket finished"
            );
            responses.extend(bucket_responses);
        }

        let outcome = BatchOutcome { responses };
        tracing::info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "Batch finished"
        );
        outcome
    }

    async fn run_bucket(
        &self,
        op: OperationType,
        items: Vec<rosterline_types::request::IncomingRequest>,
    ) -> Vec<Response> {
        if op.is_link() {
            match LinkPipeline::new(
                op,
                self.store.clone(),
                self.cache.clone(),
                self.gateway.clone(),
                self.config.chunk_cap,
                self.config.dispatch_concurrency,
            ) {
                Ok(pipeline) => compose(&pipeline, items).await,
                Err(err) => {
                    // Unreachable for the closed operation set; settle the
                    // bucket rather than drop it.
                    tracing::error!(op = op.as_str(), error = %err, "Link pipeline setup failed");
                    let onboarding = rosterline_types::error::OnboardingError::internal(
                        "PIPELINE_SETUP_FAILED",
                        format!("pipeline setup failed: {err}"),
                    );
                    items
                        .iter()
                        .map(|item| {
                            Response::failure(
                                item.correlation.clone(),
                                op.response_kind(),
                                item.correlation.id.clone(),
                                &onboarding,
                            )
                        })
                        .collect()
                }
            }
        } else {
            let pipeline = CreatePipeline::new(
                op,
                self.store.clone(),
                self.cache.clone(),
                self.gateway.clone(),
            );
            compose(&pipeline, items).await
        }
    }
}
