//! Four-stage entity pipeline and its executor.
//!
//! Every operation type runs the same shape: validate, prepare,
//! send_request, persist. Stages return a [`StageOutcome`] that splits
//! survivors from items that already received a verdict; [`compose`]
//! threads survivors through and accumulates verdicts monotonically, so
//! each logical sub-item ends with exactly one [`Response`].

use async_trait::async_trait;

use rosterline_types::correlation::CorrelationId;
use rosterline_types::error::OnboardingError;
use rosterline_types::op::{EntityKind, OperationType};
use rosterline_types::outcome::StageOutcome;
use rosterline_types::request::{IncomingRequest, Payload};
use rosterline_types::response::Response;

use crate::errors::PipelineError;

/// Attribution for items flowing through pipeline stages.
///
/// When a whole stage fails, the executor uses this to emit one failure
/// verdict per correlation pair the item represents.
pub trait Correlated {
    /// Every correlation pair this item answers for. Link items fan out
    /// to one pair per child.
    fn correlations(&self) -> Vec<CorrelationId>;
    /// Entity kind verdicts for this item report on.
    fn entity_kind(&self) -> EntityKind;
    /// External id used when attributing a failure.
    fn external_id(&self) -> String;
}

impl Correlated for IncomingRequest {
    fn correlations(&self) -> Vec<CorrelationId> {
        match &self.payload {
            Payload::Create(_) => vec![self.correlation.clone()],
            Payload::Link(spec) if spec.children.is_empty() => vec![self.correlation.clone()],
            Payload::Link(spec) => spec
                .children
                .iter()
                .map(|_| self.correlation.clone())
                .collect(),
        }
    }

    fn entity_kind(&self) -> EntityKind {
        self.op.response_kind()
    }

    fn external_id(&self) -> String {
        match &self.payload {
            Payload::Create(spec) => spec.external_id.clone(),
            Payload::Link(spec) => spec.owner_external_id.clone(),
        }
    }
}

/// One operation type's processing stages.
///
/// Implementations own their collaborators (store, cache, gateway); the
/// executor owns only the control flow. Stage `Err` means the stage as a
/// whole could not run; per-item failures belong in the
/// [`StageOutcome::invalid`] side instead.
#[async_trait]
pub trait EntityPipeline: Send + Sync {
    /// Output of `prepare`: validated items with references resolved.
    type Prepared: Correlated + Send;
    /// Output of `send_request`: items confirmed by the remote service.
    type Committed: Correlated + Send;

    fn op(&self) -> OperationType;

    /// Structural and referential checks. No side effects.
    async fn validate(
        &self,
        items: Vec<IncomingRequest>,
    ) -> Result<StageOutcome<IncomingRequest>, PipelineError>;

    /// Resolve references and merge duplicates. No remote writes.
    async fn prepare(
        &self,
        items: Vec<IncomingRequest>,
    ) -> Result<StageOutcome<Self::Prepared>, PipelineError>;

    /// Perform the remote bulk write.
    async fn send_request(
        &self,
        items: Vec<Self::Prepared>,
    ) -> Result<StageOutcome<Self::Committed>, PipelineError>;

    /// Record confirmed results locally and emit final success verdicts.
    async fn persist(&self, items: Vec<Self::Committed>) -> Result<Vec<Response>, PipelineError>;
}

/// Run one bucket through all four stages.
///
/// An empty bucket returns immediately without invoking any stage. A
/// stage-level `Err` downgrades every surviving item to an internal-error
/// verdict instead of propagating; the batch as a whole never aborts.
pub async fn compose<P: EntityPipeline>(pipeline: &P, items: Vec<IncomingRequest>) -> Vec<Response> {
    if items.is_empty() {
        return Vec::new();
    }

    let op = pipeline.op();
    let mut responses = Vec::new();

    let validated = match pipeline.validate(items.clone()).await {
        Ok(outcome) => outcome,
        Err(err) => return fail_all(op, "validate", &items, &err),
    };
    responses.extend(validated.invalid);

    let prepared = match pipeline.prepare(validated.valid.clone()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            responses.extend(fail_all(op, "prepare", &validated.valid, &err));
            return responses;
        }
    };
    responses.extend(prepared.invalid);

    // Consuming stages get their survivors' attribution snapshotted first,
    // so a whole-stage failure can still answer every item.
    let attribution = snapshot(&prepared.valid);
    let committed = match pipeline.send_request(prepared.valid).await {
        Ok(outcome) => outcome,
        Err(err) => {
            responses.extend(fail_snapshot(op, "send_request", attribution, &err));
            return responses;
        }
    };
    responses.extend(committed.invalid);

    let attribution = snapshot(&committed.valid);
    match pipeline.persist(committed.valid).await {
        Ok(final_responses) => responses.extend(final_responses),
        Err(err) => {
            responses.extend(fail_snapshot(op, "persist", attribution, &err));
        }
    }

    responses
}

type Attribution = Vec<(Vec<CorrelationId>, EntityKind, String)>;

fn snapshot<T: Correlated>(items: &[T]) -> Attribution {
    items
        .iter()
        .map(|item| (item.correlations(), item.entity_kind(), item.external_id()))
        .collect()
}

fn fail_snapshot(
    op: OperationType,
    stage: &str,
    attribution: Attribution,
    err: &PipelineError,
) -> Vec<Response> {
    tracing::error!(op = op.as_str(), stage, error = %err, "Pipeline stage failed");
    let onboarding = match err.as_onboarding_error() {
        Some(e) => e.clone(),
        None => OnboardingError::internal("STAGE_FAILED", format!("{stage} stage failed: {err}")),
    };
    let mut responses = Vec::new();
    for (correlations, kind, external_id) in attribution {
        for corr in correlations {
            responses.push(Response::failure(corr, kind, external_id.clone(), &onboarding));
        }
    }
    responses
}

/// One internal-error verdict per correlation pair of each item.
fn fail_all<T: Correlated>(
    op: OperationType,
    stage: &str,
    items: &[T],
    err: &PipelineError,
) -> Vec<Response> {
    tracing::error!(op = op.as_str(), stage, error = %err, "Pipeline stage failed");
    let onboarding = match err.as_onboarding_error() {
        Some(e) => e.clone(),
        None => OnboardingError::internal("STAGE_FAILED", format!("{stage} stage failed: {err}")),
    };
    let mut responses = Vec::new();
    for item in items {
        let kind = item.entity_kind();
        let external_id = item.external_id();
        for corr in item.correlations() {
            responses.push(Response::failure(corr, kind, external_id.clone(), &onboarding));
        }
    }
    responses
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rosterline_types::request::CreateSpec;

    struct CountingPipeline {
        calls: AtomicUsize,
        fail_prepare: bool,
    }

    #[async_trait]
    impl EntityPipeline for CountingPipeline {
        type Prepared = IncomingRequest;
        type Committed = IncomingRequest;

        fn op(&self) -> OperationType {
            OperationType::CreateOrganization
        }

        async fn validate(
            &self,
            items: Vec<IncomingRequest>,
        ) -> Result<StageOutcome<IncomingRequest>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutcome::all_valid(items))
        }

        async fn prepare(
            &self,
            items: Vec<IncomingRequest>,
        ) -> Result<StageOutcome<IncomingRequest>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_prepare {
                return Err(anyhow::anyhow!("store unavailable").into());
            }
            Ok(StageOutcome::all_valid(items))
        }

        async fn send_request(
            &self,
            items: Vec<IncomingRequest>,
        ) -> Result<StageOutcome<IncomingRequest>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutcome::all_valid(items))
        }

        async fn persist(
            &self,
            items: Vec<IncomingRequest>,
        ) -> Result<Vec<Response>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(items
                .into_iter()
                .map(|item| {
                    Response::success(item.correlation, EntityKind::Organization, "int_1")
                })
                .collect())
        }
    }

    fn org_item(request_id: &str) -> IncomingRequest {
        IncomingRequest {
            correlation: CorrelationId::new(request_id, 0),
            op: OperationType::CreateOrganization,
            payload: Payload::Create(CreateSpec {
                external_id: "org-1".into(),
                name: "District".into(),
                parent_external_id: None,
                email: None,
            }),
        }
    }

    #[tokio::test]
    async fn empty_bucket_skips_every_stage() {
        let pipeline = CountingPipeline {
            calls: AtomicUsize::new(0),
            fail_prepare: false,
        };
        let responses = compose(&pipeline, Vec::new()).await;
        assert!(responses.is_empty());
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clean_run_yields_one_success_per_item() {
        let pipeline = CountingPipeline {
            calls: AtomicUsize::new(0),
            fail_prepare: false,
        };
        let responses = compose(&pipeline, vec![org_item("r1"), org_item("r2")]).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.success));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stage_failure_downgrades_survivors_to_internal_errors() {
        let pipeline = CountingPipeline {
            calls: AtomicUsize::new(0),
            fail_prepare: true,
        };
        let responses = compose(&pipeline, vec![org_item("r1"), org_item("r2")]).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| !r.success));
        assert!(responses.iter().all(|r| {
            r.error_kind() == Some(rosterline_types::error::ErrorKind::Internal)
        }));
        // send_request and persist never ran.
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 2);
    }
}
