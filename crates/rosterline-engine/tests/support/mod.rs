//! Shared test fixtures: a programmable admin gateway and request builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rosterline_engine::remote::{
    AdminGateway, ConflictPair, RemoteCreateRequest, RemoteCreateResult, RemoteCreateStatus,
    RemoteError,
};
use rosterline_types::op::{EntityKind, LinkKind};
use rosterline_types::request::{ChildRef, CreateEntityPayload, CreateUserPayload, LinkPayload, RawRequest};

/// In-memory admin service. Creates succeed with generated ids unless an
/// external id is scripted to already exist; link writes conflict once
/// per scripted pair, mimicking remote idempotency state.
#[derive(Default)]
pub struct FakeGateway {
    inner: Mutex<FakeGatewayState>,
}

#[derive(Default)]
struct FakeGatewayState {
    next_id: u32,
    existing: HashMap<(EntityKind, String), String>,
    linked_pairs: Vec<ConflictPair>,
    create_calls: Vec<(EntityKind, usize)>,
    link_calls: Vec<(String, Vec<String>)>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend `external_id` was onboarded remotely in an earlier batch.
    pub fn seed_existing(&self, kind: EntityKind, external_id: &str, internal_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .existing
            .insert((kind, external_id.to_string()), internal_id.to_string());
    }

    /// Pretend the (owner, child) pair is already linked remotely.
    pub fn seed_linked(&self, owner_internal: &str, child_internal: &str) {
        self.inner.lock().unwrap().linked_pairs.push(ConflictPair {
            owner_id: owner_internal.to_string(),
            child_id: child_internal.to_string(),
        });
    }

    pub fn create_calls(&self) -> Vec<(EntityKind, usize)> {
        self.inner.lock().unwrap().create_calls.clone()
    }

    pub fn link_calls(&self) -> Vec<(String, Vec<String>)> {
        self.inner.lock().unwrap().link_calls.clone()
    }
}

#[async_trait]
impl AdminGateway for FakeGateway {
    async fn bulk_create(
        &self,
        kind: EntityKind,
        items: Vec<RemoteCreateRequest>,
    ) -> Result<Vec<RemoteCreateResult>, RemoteError> {
        let mut state = self.inner.lock().unwrap();
        state.create_calls.push((kind, items.len()));
        Ok(items
            .into_iter()
            .map(|item| {
                let key = (kind, item.external_id.clone());
                if let Some(existing) = state.existing.get(&key) {
                    return RemoteCreateResult {
                        external_id: item.external_id,
                        status: RemoteCreateStatus::AlreadyExists {
                            internal_id: Some(existing.clone()),
                        },
                    };
                }
                state.next_id += 1;
                let internal_id = format!("{}_{}", kind.as_str(), state.next_id);
                state.existing.insert(key, internal_id.clone());
                RemoteCreateResult {
                    external_id: item.external_id,
                    status: RemoteCreateStatus::Created { internal_id },
                }
            })
            .collect())
    }

    async fn write_links(
        &self,
        _link: LinkKind,
        owner_internal: &str,
        children_internal: &[String],
    ) -> Result<(), RemoteError> {
        let mut state = self.inner.lock().unwrap();
        state
            .link_calls
            .push((owner_internal.to_string(), children_internal.to_vec()));

        let conflicts: Vec<ConflictPair> = state
            .linked_pairs
            .iter()
            .filter(|p| p.owner_id == owner_internal && children_internal.contains(&p.child_id))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(RemoteError::DuplicateConflict { pairs: conflicts });
        }
        for child in children_internal {
            state.linked_pairs.push(ConflictPair {
                owner_id: owner_internal.to_string(),
                child_id: child.clone(),
            });
        }
        Ok(())
    }
}

pub fn create_org(request_id: &str, external_id: &str, name: &str) -> RawRequest {
    RawRequest {
        request_id: request_id.into(),
        create_organization: Some(CreateEntityPayload {
            external_id: external_id.into(),
            name: name.into(),
            parent_external_id: None,
        }),
        ..RawRequest::default()
    }
}

pub fn create_school(request_id: &str, external_id: &str, parent: &str) -> RawRequest {
    RawRequest {
        request_id: request_id.into(),
        create_school: Some(CreateEntityPayload {
            external_id: external_id.into(),
            name: "North High".into(),
            parent_external_id: Some(parent.into()),
        }),
        ..RawRequest::default()
    }
}

pub fn create_class(request_id: &str, external_id: &str, parent: &str) -> RawRequest {
    RawRequest {
        request_id: request_id.into(),
        create_class: Some(CreateEntityPayload {
            external_id: external_id.into(),
            name: "Algebra 1".into(),
            parent_external_id: Some(parent.into()),
        }),
        ..RawRequest::default()
    }
}

pub fn create_user(request_id: &str, external_id: &str, org: &str) -> RawRequest {
    RawRequest {
        request_id: request_id.into(),
        create_user: Some(CreateUserPayload {
            external_id: external_id.into(),
            name: "Ada Lovelace".into(),
            organization_external_id: org.into(),
            email: None,
        }),
        ..RawRequest::default()
    }
}

pub fn add_users_to_class(request_id: &str, owner: &str, children: &[&str]) -> RawRequest {
    RawRequest {
        request_id: request_id.into(),
        add_users_to_class: Some(LinkPayload {
            owner_external_id: owner.into(),
            children: children
                .iter()
                .map(|id| ChildRef {
                    external_id: (*id).into(),
                    display_name: None,
                })
                .collect(),
        }),
        ..RawRequest::default()
    }
}
