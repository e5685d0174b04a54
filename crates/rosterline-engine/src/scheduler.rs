//! Batch classification and topological replay.
//!
//! `classify_batch` buckets raw items by operation type and normalizes
//! their payloads. [`BatchPlan::next_bucket`] then replays the non-empty
//! buckets in [`EXECUTION_ORDER`], so creations commit before the links
//! that reference them within the same batch.

use std::collections::HashMap;

use rosterline_types::error::OnboardingError;
use rosterline_types::op::{OperationType, EXECUTION_ORDER};
use rosterline_types::request::{
    ChildRef, CreateSpec, IncomingRequest, LinkSpec, Payload, RawRequest,
};
use rosterline_types::response::Response;

/// A classified batch: per-operation buckets plus the verdicts for items
/// that never made it into one.
pub struct BatchPlan {
    buckets: HashMap<OperationType, Vec<IncomingRequest>>,
    invalid: Vec<Response>,
    cursor: usize,
}

impl BatchPlan {
    /// Next non-empty bucket in execution order, consuming it.
    ///
    /// Returns `None` only after every operation type has been visited.
    pub fn next_bucket(&mut self) -> Option<(OperationType, Vec<IncomingRequest>)> {
        while self.cursor < EXECUTION_ORDER.len() {
            let op = EXECUTION_ORDER[self.cursor];
            self.cursor += 1;
            if let Some(items) = self.buckets.remove(&op) {
                if !items.is_empty() {
                    return Some((op, items));
                }
            }
        }
        None
    }

    /// Verdicts for unclassifiable items, drained once by the orchestrator.
    pub fn take_invalid(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.invalid)
    }

    /// Number of classified items across all remaining buckets.
    #[must_use]
    pub fn classified_len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Classify a raw batch into a replay plan.
///
/// Items with zero or multiple sub-payloads set never enter a bucket;
/// they yield an immediate validation failure attributed to the item's
/// correlation pair.
pub fn classify_batch(batch: Vec<RawRequest>) -> BatchPlan {
    let mut buckets: HashMap<OperationType, Vec<IncomingRequest>> = HashMap::new();
    let mut invalid = Vec::new();

    for raw in batch {
        let correlation = raw.correlation();
        let op = match raw.operation() {
            Some(op) => op,
            None => {
                let present = raw.present_operations();
                let err = if present.is_empty() {
                    OnboardingError::validation(
                        "NO_OPERATION",
                        "request carries no operation payload",
                    )
                } else {
                    let names: Vec<&str> = present.iter().map(|op| op.as_str()).collect();
                    OnboardingError::validation(
                        "AMBIGUOUS_OPERATION",
                        format!("request carries multiple operation payloads: {}", names.join(", ")),
                    )
                };
                // No operation means no entity kind either; report against
                // the first present one or fall back to organization.
                let kind = present
                    .first()
                    .map_or(rosterline_types::op::EntityKind::Organization, |op| {
                        op.response_kind()
                    });
                invalid.push(Response::failure(correlation, kind, raw.request_id.clone(), &err));
                continue;
            }
        };

        let payload = normalize(op, &raw);
        buckets.entry(op).or_default().push(IncomingRequest {
            correlation,
            op,
            payload,
        });
    }

    tracing::debug!(
        buckets = buckets.len(),
        classified = buckets.values().map(Vec::len).sum::<usize>(),
        invalid = invalid.len(),
        "Classified batch"
    );

    BatchPlan {
        buckets,
        invalid,
        cursor: 0,
    }
}

/// Normalize the single present sub-payload for `op`.
///
/// External ids are case-folded to lowercase; link child lists are
/// de-duplicated preserving first-occurrence order.
fn normalize(op: OperationType, raw: &RawRequest) -> Payload {
    if op.is_link() {
        let link = match op {
            OperationType::AddUsersToOrganization => &raw.add_users_to_organization,
            OperationType::AddUsersToSchool => &raw.add_users_to_school,
            OperationType::AddClassesToSchool => &raw.add_classes_to_school,
            OperationType::AddUsersToClass => &raw.add_users_to_class,
            OperationType::AddProgramsToSchool => &raw.add_programs_to_school,
            OperationType::AddProgramsToClass => &raw.add_programs_to_class,
            OperationType::AddProgramsToUser => &raw.add_programs_to_user,
            _ => &None,
        };
        // operation() guaranteed the payload is present.
        let link = link.as_ref().cloned().unwrap_or(rosterline_types::request::LinkPayload {
            owner_external_id: String::new(),
            children: Vec::new(),
        });
        let mut seen = std::collections::HashSet::new();
        let mut children = Vec::new();
        for child in link.children {
            let external_id = child.external_id.to_lowercase();
            if seen.insert(external_id.clone()) {
                children.push(ChildRef {
                    external_id,
                    display_name: child.display_name,
                });
            }
        }
        return Payload::Link(LinkSpec {
            owner_external_id: link.owner_external_id.to_lowercase(),
            children,
        });
    }

    if op == OperationType::CreateUser {
        let user = raw.create_user.clone().unwrap_or(
            rosterline_types::request::CreateUserPayload {
                external_id: String::new(),
                name: String::new(),
                organization_external_id: String::new(),
                email: None,
            },
        );
        return Payload::Create(CreateSpec {
            external_id: user.external_id.to_lowercase(),
            name: user.name,
            parent_external_id: Some(user.organization_external_id.to_lowercase()),
            email: user.email,
        });
    }

    let entity = match op {
        OperationType::CreateOrganization => &raw.create_organization,
        OperationType::CreateSchool => &raw.create_school,
        OperationType::CreateClass => &raw.create_class,
        _ => &None,
    };
    let entity = entity.as_ref().cloned().unwrap_or(
        rosterline_types::request::CreateEntityPayload {
            external_id: String::new(),
            name: String::new(),
            parent_external_id: None,
        },
    );
    Payload::Create(CreateSpec {
        external_id: entity.external_id.to_lowercase(),
        name: entity.name,
        parent_external_id: entity.parent_external_id.map(|p| p.to_lowercase()),
        email: None,
    })
}
