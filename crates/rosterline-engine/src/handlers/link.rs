//! Association pipeline.
//!
//! Handles the seven link operations. `validate` checks shape and that
//! the owner and every child are already onboarded, fanning reference
//! failures out per child; `prepare` resolves survivors to internal ids;
//! `send_request` hands resolved groups to the chunker for bulk dispatch;
//! `persist` records confirmed pairs locally and emits one verdict per
//! (correlation, child).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use rosterline_state::IdentityStore;
use rosterline_types::correlation::CorrelationId;
use rosterline_types::error::OnboardingError;
use rosterline_types::op::{EntityKind, LinkKind, OperationType};
use rosterline_types::outcome::StageOutcome;
use rosterline_types::request::{IncomingRequest, LinkSpec, Payload};
use rosterline_types::response::Response;

use crate::cache::ResolveCache;
use crate::chunker::{self, CommittedLink, LinkGroup, ResolvedChild};
use crate::errors::PipelineError;
use crate::pipeline::{Correlated, EntityPipeline};
use crate::remote::AdminGateway;

/// One resolved link request flowing into the chunker.
#[derive(Debug, Clone)]
pub struct PreparedLinks {
    kind: EntityKind,
    group: LinkGroup,
}

/// One remotely-confirmed pair awaiting local persistence.
#[derive(Debug, Clone)]
pub struct CommittedLinks {
    kind: EntityKind,
    link: CommittedLink,
}

impl Correlated for PreparedLinks {
    fn correlations(&self) -> Vec<CorrelationId> {
        if self.group.children.is_empty() {
            vec![self.group.correlation.clone()]
        } else {
            self.group
                .children
                .iter()
                .map(|_| self.group.correlation.clone())
                .collect()
        }
    }
    fn entity_kind(&self) -> EntityKind {
        self.kind
    }
    fn external_id(&self) -> String {
        self.group.owner_external_id.clone()
    }
}

impl Correlated for CommittedLinks {
    fn correlations(&self) -> Vec<CorrelationId> {
        self.link.correlations.clone()
    }
    fn entity_kind(&self) -> EntityKind {
        self.kind
    }
    fn external_id(&self) -> String {
        self.link.child_external_id.clone()
    }
}

/// Pipeline for one of the seven association operations.
pub struct LinkPipeline {
    op: OperationType,
    link: LinkKind,
    store: Arc<dyn IdentityStore>,
    cache: Arc<ResolveCache>,
    gateway: Arc<dyn AdminGateway>,
    chunk_cap: usize,
    concurrency: usize,
}

impl LinkPipeline {
    /// Builds the pipeline for `op`, which must be a link operation.
    ///
    /// # Errors
    ///
    /// Returns an error when `op` is a create operation.
    pub fn new(
        op: OperationType,
        store: Arc<dyn IdentityStore>,
        cache: Arc<ResolveCache>,
        gateway: Arc<dyn AdminGateway>,
        chunk_cap: usize,
        concurrency: usize,
    ) -> Result<Self, PipelineError> {
        let link = op
            .link_kind()
            .ok_or_else(|| anyhow::anyhow!("{op} is not a link operation"))?;
        Ok(Self {
            op,
            link,
            store,
            cache,
            gateway,
            chunk_cap,
            concurrency,
        })
    }

    /// Kind verdicts report on: the child entity.
    fn kind(&self) -> EntityKind {
        self.link.child_kind()
    }
}

#[async_trait]
impl EntityPipeline for LinkPipeline {
    type Prepared = PreparedLinks;
    type Committed = CommittedLinks;

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
            let Some(spec) = item.as_link() else {
                let err = OnboardingError::internal(
                    "PAYLOAD_MISMATCH",
                    format!("{} bucket received a non-link payload", self.op),
                );
                outcome.push_invalid(Response::failure(
                    item.correlation.clone(),
                    kind,
                    item.external_id(),
                    &err,
                ));
                continue;
            };
            if spec.owner_external_id.is_empty() {
                let err = OnboardingError::validation(
                    "OWNER_ID_EMPTY",
                    "ownerExternalId must not be empty",
                );
                outcome.push_invalid(Response::failure(
                    item.correlation.clone(),
                    kind,
                    item.external_id(),
                    &err,
                ));
                continue;
            }
            if spec.children.is_empty() {
                let err =
                    OnboardingError::validation("NO_CHILDREN", "children must not be empty");
                outcome.push_invalid(Response::failure(
                    item.correlation.clone(),
                    kind,
                    spec.owner_external_id.clone(),
                    &err,
                ));
                continue;
            }
            if spec.children.iter().any(|c| c.external_id.is_empty()) {
                let err = OnboardingError::validation(
                    "CHILD_ID_EMPTY",
                    "child externalId must not be empty",
                );
                // One verdict per child keeps fan-out counts stable.
                for _ in &spec.children {
                    outcome.push_invalid(Response::failure(
                        item.correlation.clone(),
                        kind,
                        spec.owner_external_id.clone(),
                        &err,
                    ));
                }
                continue;
            }

            let owner_kind = self.link.owner_kind();
            if self
                .cache
                .resolve(self.store.as_ref(), owner_kind, &spec.owner_external_id)?
                .is_none()
            {
                let err = OnboardingError::not_found(
                    "OWNER_NOT_FOUND",
                    format!(
                        "{owner_kind} {} has not been onboarded",
                        spec.owner_external_id
                    ),
                );
                // The whole request fails, one verdict per child.
                for child in &spec.children {
                    outcome.push_invalid(Response::failure(
                        item.correlation.clone(),
                        kind,
                        child.external_id.clone(),
                        &err,
                    ));
                }
                continue;
            }

            let mut kept = Vec::new();
            for child in &spec.children {
                if self
                    .cache
                    .resolve(self.store.as_ref(), kind, &child.external_id)?
                    .is_some()
                {
                    kept.push(child.clone());
                } else {
                    let err = OnboardingError::not_found(
                        "CHILD_NOT_FOUND",
                        format!("{kind} {} has not been onboarded", child.external_id),
                    );
                    outcome.push_invalid(Response::failure(
                        item.correlation.clone(),
                        kind,
                        child.external_id.clone(),
                        &err,
                    ));
                }
            }
            if kept.is_empty() {
                continue;
            }
            if kept.len() == spec.children.len() {
                outcome.push_valid(item);
            } else {
                // Settled children drop out; the survivor carries the rest.
                outcome.push_valid(IncomingRequest {
                    correlation: item.correlation.clone(),
                    op: item.op,
                    payload: Payload::Link(LinkSpec {
                        owner_external_id: spec.owner_external_id.clone(),
                        children: kept,
                    }),
                });
            }
        }
        Ok(outcome)
    }

    async fn prepare(
        &self,
        items: Vec<IncomingRequest>,
    ) -> Result<StageOutcome<PreparedLinks>, PipelineError> {
        let kind = self.kind();
        let owner_kind = self.link.owner_kind();
        let mut outcome: StageOutcome<PreparedLinks> = StageOutcome::new();

        for item in items {
            let Some(spec) = item.as_link() else {
                continue;
            };

            let owner_internal = self.cache.resolve(
                self.store.as_ref(),
                owner_kind,
                &spec.owner_external_id,
            )?;
            let Some(owner_internal_id) = owner_internal else {
                let err = OnboardingError::not_found(
                    "OWNER_NOT_FOUND",
                    format!(
                        "{owner_kind} {} has not been onboarded",
                        spec.owner_external_id
                    ),
                );
                // The whole request fails, one verdict per child.
                for child in &spec.children {
                    outcome.push_invalid(Response::failure(
                        item.correlation.clone(),
                        kind,
                        child.external_id.clone(),
                        &err,
                    ));
                }
                continue;
            };

            let mut resolved = Vec::new();
            for child in &spec.children {
                match self
                    .cache
                    .resolve(self.store.as_ref(), kind, &child.external_id)?
                {
                    Some(internal_id) => resolved.push(ResolvedChild {
                        internal_id,
                        external_id: child.external_id.clone(),
                        display_name: child.display_name.clone(),
                    }),
                    None => {
                        let err = OnboardingError::not_found(
                            "CHILD_NOT_FOUND",
                            format!("{kind} {} has not been onboarded", child.external_id),
                        );
                        outcome.push_invalid(Response::failure(
                            item.correlation.clone(),
                            kind,
                            child.external_id.clone(),
                            &err,
                        ));
                    }
                }
            }

            if !resolved.is_empty() {
                outcome.push_valid(PreparedLinks {
                    kind,
                    group: LinkGroup {
                        correlation: item.correlation.clone(),
                        owner_external_id: spec.owner_external_id.clone(),
                        owner_internal_id,
                        children: resolved,
                    },
                });
            }
        }
        Ok(outcome)
    }

    async fn send_request(
        &self,
        items: Vec<PreparedLinks>,
    ) -> Result<StageOutcome<CommittedLinks>, PipelineError> {
        if items.is_empty() {
            return Ok(StageOutcome::new());
        }
        let kind = self.kind();
        let groups = items.into_iter().map(|item| item.group).collect();
        let dispatched = chunker::dispatch(
            self.gateway.clone(),
            self.link,
            groups,
            self.chunk_cap,
            self.concurrency,
        )
        .await;

        let mut outcome = StageOutcome::all_invalid(dispatched.failures);
        for link in dispatched.committed {
            outcome.push_valid(CommittedLinks { kind, link });
        }
        Ok(outcome)
    }

    async fn persist(&self, items: Vec<CommittedLinks>) -> Result<Vec<Response>, PipelineError> {
        let kind = self.kind();
        let mut responses = Vec::new();
        // Group per owner so each owner takes one local write.
        let mut per_owner: HashMap<String, Vec<CommittedLink>> = HashMap::new();
        for item in items {
            per_owner
                .entry(item.link.owner_internal_id.clone())
                .or_default()
                .push(item.link);
        }

        for (owner_internal, links) in per_owner {
            let children: Vec<String> =
                links.iter().map(|l| l.child_internal_id.clone()).collect();
            match self
                .store
                .insert_links(self.link, &owner_internal, &children)
            {
                Ok(written) => {
                    if written.already_present > 0 {
                        tracing::debug!(
                            link = self.link.as_str(),
                            owner = owner_internal.as_str(),
                            already_present = written.already_present,
                            "Some link rows were already recorded locally"
                        );
                    }
                    for link in links {
                        for corr in link.correlations {
                            responses.push(Response::success(
                                corr,
                                kind,
                                link.child_internal_id.clone(),
                            ));
                        }
                    }
                }
                Err(store_err) => {
                    tracing::error!(
                        link = self.link.as_str(),
                        owner = owner_internal.as_str(),
                        error = %store_err,
                        "Link row write failed after remote write"
                    );
                    let err = OnboardingError::storage(
                        "LINK_WRITE_FAILED",
                        format!("link row write failed: {store_err}"),
                    );
                    for link in links {
                        for corr in link.correlations {
                            responses.push(Response::failure(
                                corr,
                                kind,
                                link.child_external_id.clone(),
                                &err,
                            ));
                        }
                    }
                }
            }
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use rosterline_state::SqliteIdentityStore;
    use rosterline_types::error::ErrorKind;
    use rosterline_types::request::ChildRef;

    use crate::pipeline::compose;
    use crate::remote::{
        ConflictPair, RemoteCreateRequest, RemoteCreateResult, RemoteError,
    };

    /// Gateway that accepts every link write, optionally conflicting on
    /// scripted pairs exactly once.
    struct LinkGatewayStub {
        conflicts: Mutex<Vec<ConflictPair>>,
        calls: Mutex<usize>,
    }

    impl LinkGatewayStub {
        fn accepting() -> Arc<Self> {
            Arc::new(Self {
                conflicts: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
            })
        }

        fn conflicting(pairs: Vec<ConflictPair>) -> Arc<Self> {
            Arc::new(Self {
                conflicts: Mutex::new(pairs),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl AdminGateway for LinkGatewayStub {
        async fn bulk_create(
            &self,
            _kind: EntityKind,
            _items: Vec<RemoteCreateRequest>,
        ) -> Result<Vec<RemoteCreateResult>, RemoteError> {
            Ok(Vec::new())
        }

        async fn write_links(
            &self,
            _link: LinkKind,
            owner_internal: &str,
            children_internal: &[String],
        ) -> Result<(), RemoteError> {
            *self.calls.lock().unwrap() += 1;
            let mut conflicts = self.conflicts.lock().unwrap();
            let hit: Vec<ConflictPair> = conflicts
                .iter()
                .filter(|p| {
                    p.owner_id == owner_internal
                        && children_internal.contains(&p.child_id)
                })
                .cloned()
                .collect();
            if hit.is_empty() {
                Ok(())
            } else {
                conflicts.retain(|p| !hit.contains(p));
                Err(RemoteError::DuplicateConflict { pairs: hit })
            }
        }
    }

    fn seeded_store() -> Arc<SqliteIdentityStore> {
        let store = Arc::new(SqliteIdentityStore::in_memory().unwrap());
        store
            .insert_mapping(EntityKind::Class, "class-1", "class_1")
            .unwrap();
        store
            .insert_mapping(EntityKind::User, "u-1", "user_1")
            .unwrap();
        store
            .insert_mapping(EntityKind::User, "u-2", "user_2")
            .unwrap();
        store
    }

    fn pipeline_with(
        store: Arc<SqliteIdentityStore>,
        gateway: Arc<LinkGatewayStub>,
    ) -> LinkPipeline {
        LinkPipeline::new(
            OperationType::AddUsersToClass,
            store,
            Arc::new(ResolveCache::new(Duration::from_secs(60))),
            gateway,
            50,
            4,
        )
        .unwrap()
    }

    fn link_item(request_id: &str, owner: &str, children: &[&str]) -> IncomingRequest {
        IncomingRequest {
            correlation: CorrelationId::new(request_id, 0),
            op: OperationType::AddUsersToClass,
            payload: Payload::Link(LinkSpec {
                owner_external_id: owner.into(),
                children: children
                    .iter()
                    .map(|id| ChildRef {
                        external_id: (*id).into(),
                        display_name: None,
                    })
                    .collect(),
            }),
        }
    }

    #[tokio::test]
    async fn links_and_persists_rows() {
        let store = seeded_store();
        let pipeline = pipeline_with(store.clone(), LinkGatewayStub::accepting());

        let responses = compose(&pipeline, vec![link_item("r1", "class-1", &["u-1", "u-2"])]).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.success));
        assert!(responses.iter().all(|r| r.entity_kind == EntityKind::User));
    }

    #[tokio::test]
    async fn unknown_owner_fans_failures_per_child() {
        let store = seeded_store();
        let pipeline = pipeline_with(store, LinkGatewayStub::accepting());

        let responses = compose(&pipeline, vec![link_item("r1", "class-ghost", &["u-1", "u-2"])]).await;
        assert_eq!(responses.len(), 2);
        assert!(responses
            .iter()
            .all(|r| r.error_kind() == Some(ErrorKind::NotFound)));
    }

    #[tokio::test]
    async fn unknown_child_fails_alone() {
        let store = seeded_store();
        let pipeline = pipeline_with(store, LinkGatewayStub::accepting());

        let responses =
            compose(&pipeline, vec![link_item("r1", "class-1", &["u-1", "u-ghost"])]).await;
        assert_eq!(responses.len(), 2);
        let (ok, failed): (Vec<_>, Vec<_>) = responses.into_iter().partition(|r| r.success);
        assert_eq!(ok.len(), 1);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].entity_id, "u-ghost");
        assert_eq!(failed[0].error_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn conflicting_pair_settles_as_already_exists() {
        let store = seeded_store();
        let gateway = LinkGatewayStub::conflicting(vec![ConflictPair {
            owner_id: "class_1".into(),
            child_id: "user_1".into(),
        }]);
        let pipeline = pipeline_with(store, gateway.clone());

        let responses = compose(&pipeline, vec![link_item("r1", "class-1", &["u-1", "u-2"])]).await;
        assert_eq!(responses.len(), 2);
        let conflict = responses.iter().find(|r| !r.success).unwrap();
        assert_eq!(conflict.error_kind(), Some(ErrorKind::AlreadyExists));
        assert_eq!(conflict.entity_id, "u-1");
        let success = responses.iter().find(|r| r.success).unwrap();
        assert_eq!(success.entity_id, "user_2");
        // Original write plus one retry with the clean subset.
        assert_eq!(*gateway.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_child_list_fails_validation() {
        let store = seeded_store();
        let pipeline = pipeline_with(store, LinkGatewayStub::accepting());

        let responses = compose(&pipeline, vec![link_item("r1", "class-1", &[])]).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].error_kind(), Some(ErrorKind::Validation));
    }
}
