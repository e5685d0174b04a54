//! Entity-create pipeline.
//!
//! Handles all four create operations. `validate` checks shape and that
//! the parent reference is already onboarded; `prepare` settles items
//! whose external id is already mapped locally, resolves the parent to
//! its internal id, and merges duplicate external ids within the bucket;
//! `send_request` performs one bulk create; `persist` records the
//! returned internal ids and emits the final verdicts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use rosterline_state::{IdentityStore, StoreError};
use rosterline_types::correlation::CorrelationId;
use rosterline_types::error::OnboardingError;
use rosterline_types::op::{EntityKind, OperationType};
use rosterline_types::outcome::StageOutcome;
use rosterline_types::request::IncomingRequest;
use rosterline_types::response::Response;

use crate::cache::ResolveCache;
use crate::errors::PipelineError;
use crate::handlers::MAX_NAME_LEN;
use crate::pipeline::{Correlated, EntityPipeline};
use crate::remote::{AdminGateway, RemoteCreateRequest, RemoteCreateStatus};

/// One to-be-created entity after duplicate merging and parent resolution.
#[derive(Debug, Clone)]
pub struct PreparedCreate {
    kind: EntityKind,
    correlations: Vec<CorrelationId>,
    external_id: String,
    name: String,
    parent_internal_id: Option<String>,
    email: Option<String>,
}

/// One remotely-confirmed entity awaiting local persistence.
#[derive(Debug, Clone)]
pub struct CommittedCreate {
    kind: EntityKind,
    correlations: Vec<CorrelationId>,
    external_id: String,
    internal_id: String,
    /// False when the remote reported the entity as pre-existing; the
    /// mapping is still recorded but the verdict is already-exists.
    newly_created: bool,
}

impl Correlated for PreparedCreate {
    fn correlations(&self) -> Vec<CorrelationId> {
        self.correlations.clone()
    }
    fn entity_kind(&self) -> EntityKind {
        self.kind
    }
    fn external_id(&self) -> String {
        self.external_id.clone()
    }
}

impl Correlated for CommittedCreate {
    fn correlations(&self) -> Vec<CorrelationId> {
        self.correlations.clone()
    }
    fn entity_kind(&self) -> EntityKind {
        self.kind
    }
    fn external_id(&self) -> String {
        self.external_id.clone()
    }
}

/// Pipeline for one of the four create operations.
pub struct CreatePipeline {
    op: OperationType,
    store: Arc<dyn IdentityStore>,
    cache: Arc<ResolveCache>,
    gateway: Arc<dyn AdminGateway>,
}

impl CreatePipeline {
    #[must_use]
    pub fn new(
        op: OperationType,
        store: Arc<dyn IdentityStore>,
        cache: Arc<ResolveCache>,
        gateway: Arc<dyn AdminGateway>,
    ) -> Self {
        Self {
            op,
            store,
            cache,
            gateway,
        }
    }

    fn kind(&self) -> EntityKind {
        self.op.response_kind()
    }

    fn fail(&self, item: &IncomingRequest, err: &OnboardingError) -> Response {
        Response::failure(
            item.correlation.clone(),
            self.kind(),
            item.external_id(),
            err,
        )
    }
}

#[async_trait]
impl EntityPipeline for CreatePipeline {
    type Prepared = PreparedCreate;
    type Committed = CommittedCreate;

    fn op(&self) -> OperationType {
        self.op
    }

    async fn validate(
        &self,
        items: Vec<IncomingRequest>,
    ) -> Result<StageOutcome<IncomingRequest>, PipelineError> {
        let kind = self.kind();
        let mut outcome = StageOutcome::new();
        for item in items {
            let Some(spec) = item.as_create() else {
                let err = OnboardingError::internal(
                    "PAYLOAD_MISMATCH",
                    format!("{} bucket received a non-create payload", self.op),
                );
                outcome.push_invalid(self.fail(&item, &err));
                continue;
            };
            if spec.external_id.is_empty() {
                let err =
                    OnboardingError::validation("EXTERNAL_ID_EMPTY", "externalId must not be empty");
                outcome.push_invalid(self.fail(&item, &err));
                continue;
            }
            if spec.name.trim().is_empty() {
                let err = OnboardingError::validation("NAME_EMPTY", "name must not be empty");
                outcome.push_invalid(self.fail(&item, &err));
                continue;
            }
            if spec.name.chars().count() > MAX_NAME_LEN {
                let err = OnboardingError::validation(
                    "NAME_TOO_LONG",
                    format!("name exceeds {MAX_NAME_LEN} characters"),
                )
                .with_details(serde_json::json!({ "max": MAX_NAME_LEN }));
                outcome.push_invalid(self.fail(&item, &err));
                continue;
            }
            if kind.parent_kind().is_some() && spec.parent_external_id.is_none() {
                let err = OnboardingError::validation(
                    "PARENT_MISSING",
                    format!("{kind} creation requires a parent reference"),
                );
                outcome.push_invalid(self.fail(&item, &err));
                continue;
            }
            if let (Some(parent_kind), Some(parent_ext)) =
                (kind.parent_kind(), &spec.parent_external_id)
            {
                if self
                    .cache
                    .resolve(self.store.as_ref(), parent_kind, parent_ext)?
                    .is_none()
                {
                    let err = OnboardingError::not_found(
                        "PARENT_NOT_FOUND",
                        format!("{parent_kind} {parent_ext} has not been onboarded"),
                    );
                    outcome.push_invalid(self.fail(&item, &err));
                    continue;
                }
            }
            outcome.push_valid(item);
        }
        Ok(outcome)
    }

    async fn prepare(
        &self,
        items: Vec<IncomingRequest>,
    ) -> Result<StageOutcome<PreparedCreate>, PipelineError> {
        let kind = self.kind();
        let mut outcome: StageOutcome<PreparedCreate> = StageOutcome::new();
        // Merged by external id; order of first appearance is kept.
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, PreparedCreate> = HashMap::new();

        for item in items {
            let Some(spec) = item.as_create() else {
                continue;
            };

            if self
                .cache
                .resolve(self.store.as_ref(), kind, &spec.external_id)?
                .is_some()
            {
                let err = OnboardingError::already_exists(
                    "ENTITY_EXISTS",
                    format!("{kind} {} is already onboarded", spec.external_id),
                );
                outcome.push_invalid(self.fail(&item, &err));
                continue;
            }

            let parent_internal_id = match (kind.parent_kind(), &spec.parent_external_id) {
                (Some(parent_kind), Some(parent_ext)) => {
                    match self.cache.resolve(self.store.as_ref(), parent_kind, parent_ext)? {
                        Some(internal) => Some(internal),
                        None => {
                            let err = OnboardingError::not_found(
                                "PARENT_NOT_FOUND",
                                format!("{parent_kind} {parent_ext} has not been onboarded"),
                            );
                            outcome.push_invalid(self.fail(&item, &err));
                            continue;
                        }
                    }
                }
                _ => None,
            };

            match merged.get_mut(&spec.external_id) {
                None => {
                    order.push(spec.external_id.clone());
                    merged.insert(
                        spec.external_id.clone(),
                        PreparedCreate {
                            kind,
                            correlations: vec![item.correlation.clone()],
                            external_id: spec.external_id.clone(),
                            name: spec.name.clone(),
                            parent_internal_id,
                            email: spec.email.clone(),
                        },
                    );
                }
                Some(existing) => {
                    let compatible = existing.name == spec.name
                        && compatible_opt(&existing.email, &spec.email)
                        && compatible_opt(&existing.parent_internal_id, &parent_internal_id);
                    if compatible {
                        existing.correlations.push(item.correlation.clone());
                        if existing.email.is_none() {
                            existing.email = spec.email.clone();
                        }
                        if existing.parent_internal_id.is_none() {
                            existing.parent_internal_id = parent_internal_id;
                        }
                    } else {
                        // Conflicting duplicates settle every correlation,
                        // including the ones already merged.
                        let err = OnboardingError::validation(
                            "CONFLICTING_DUPLICATE",
                            format!(
                                "{kind} {} appears twice with conflicting fields",
                                spec.external_id
                            ),
                        );
                        let removed = merged.remove(&spec.external_id);
                        order.retain(|id| id != &spec.external_id);
                        if let Some(removed) = removed {
                            for corr in removed.correlations {
                                outcome.push_invalid(Response::failure(
                                    corr,
                                    kind,
                                    removed.external_id.clone(),
                                    &err,
                                ));
                            }
                        }
                        outcome.push_invalid(self.fail(&item, &err));
                    }
                }
            }
        }

        for external_id in order {
            if let Some(prepared) = merged.remove(&external_id) {
                outcome.push_valid(prepared);
            }
        }
        Ok(outcome)
    }

    async fn send_request(
        &self,
        items: Vec<PreparedCreate>,
    ) -> Result<StageOutcome<CommittedCreate>, PipelineError> {
        if items.is_empty() {
            return Ok(StageOutcome::new());
        }
        let kind = self.kind();
        let requests: Vec<RemoteCreateRequest> = items
            .iter()
            .map(|item| RemoteCreateRequest {
                external_id: item.external_id.clone(),
                name: item.name.clone(),
                parent_internal_id: item.parent_internal_id.clone(),
                kind,
                email: item.email.clone(),
            })
            .collect();

        tracing::debug!(op = self.op.as_str(), items = items.len(), "Bulk create");
        let results = match self.gateway.bulk_create(kind, requests).await {
            Ok(results) => results,
            Err(err) => {
                let onboarding = if err.is_retryable() {
                    OnboardingError::remote("BULK_CREATE_FAILED", format!("bulk create failed: {err}"))
                } else {
                    OnboardingError::internal(
                        "BULK_CREATE_FAILED",
                        format!("bulk create failed: {err}"),
                    )
                };
                let mut outcome = StageOutcome::new();
                for item in items {
                    for corr in item.correlations {
                        outcome.push_invalid(Response::failure(
                            corr,
                            kind,
                            item.external_id.clone(),
                            &onboarding,
                        ));
                    }
                }
                return Ok(outcome);
            }
        };

        let by_external: HashMap<String, RemoteCreateStatus> = results
            .into_iter()
            .map(|r| (r.external_id, r.status))
            .collect();

        let mut outcome = StageOutcome::new();
        for item in items {
            match by_external.get(&item.external_id) {
                Some(RemoteCreateStatus::Created { internal_id }) => {
                    outcome.push_valid(CommittedCreate {
                        kind,
                        correlations: item.correlations,
                        external_id: item.external_id,
                        internal_id: internal_id.clone(),
                        newly_created: true,
                    });
                }
                Some(RemoteCreateStatus::AlreadyExists {
                    internal_id: Some(internal_id),
                }) => {
                    outcome.push_valid(CommittedCreate {
                        kind,
                        correlations: item.correlations,
                        external_id: item.external_id,
                        internal_id: internal_id.clone(),
                        newly_created: false,
                    });
                }
                Some(RemoteCreateStatus::AlreadyExists { internal_id: None }) => {
                    let err = OnboardingError::already_exists(
                        "ENTITY_EXISTS",
                        format!("{kind} {} already exists remotely", item.external_id),
                    );
                    for corr in item.correlations {
                        outcome.push_invalid(Response::failure(
                            corr,
                            kind,
                            item.external_id.clone(),
                            &err,
                        ));
                    }
                }
                Some(RemoteCreateStatus::Rejected { message }) => {
                    let err = OnboardingError::validation("REMOTE_REJECTED", message.clone());
                    for corr in item.correlations {
                        outcome.push_invalid(Response::failure(
                            corr,
                            kind,
                            item.external_id.clone(),
                            &err,
                        ));
                    }
                }
                None => {
                    let err = OnboardingError::internal(
                        "RESULT_MISSING",
                        format!(
                            "remote returned no result for {kind} {}",
                            item.external_id
                        ),
                    );
                    for corr in item.correlations {
                        outcome.push_invalid(Response::failure(
                            corr,
                            kind,
                            item.external_id.clone(),
                            &err,
                        ));
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn persist(
        &self,
        items: Vec<CommittedCreate>,
    ) -> Result<Vec<Response>, PipelineError> {
        let mut responses = Vec::new();
        for item in items {
            match self
                .store
                .insert_mapping(item.kind, &item.external_id, &item.internal_id)
            {
                // A concurrent run recorded the same mapping first; the
                // remote entity exists either way.
                Ok(()) | Err(StoreError::AlreadyExists { .. }) => {
                    self.cache
                        .put(item.kind, &item.external_id, Some(item.internal_id.clone()));
                    if item.newly_created {
                        for corr in item.correlations {
                            responses.push(Response::success(
                                corr,
                                item.kind,
                                item.internal_id.clone(),
                            ));
                        }
                    } else {
                        let err = OnboardingError::already_exists(
                            "ENTITY_EXISTS",
                            format!("{} {} already exists remotely", item.kind, item.external_id),
                        );
                        for corr in item.correlations {
                            responses.push(Response::failure(
                                corr,
                                item.kind,
                                item.external_id.clone(),
                                &err,
                            ));
                        }
                    }
                }
                Err(store_err) => {
                    // The remote holds the entity; the caller must not
                    // resubmit the create, only reconcile the mapping.
                    tracing::error!(
                        kind = item.kind.as_str(),
                        external_id = item.external_id.as_str(),
                        error = %store_err,
                        "Mapping write failed after remote create"
                    );
                    let err = OnboardingError::storage(
                        "MAPPING_WRITE_FAILED",
                        format!("mapping write failed: {store_err}"),
                    )
                    .with_details(serde_json::json!({ "internalId": item.internal_id }));
                    for corr in item.correlations {
                        responses.push(Response::failure(
                            corr,
                            item.kind,
                            item.external_id.clone(),
                            &err,
                        ));
                    }
                }
            }
        }
        Ok(responses)
    }
}

fn compatible_opt(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}
