//! Inbound request shapes.
//!
//! [`RawRequest`] is the wire shape: a correlation pair plus exactly one
//! operation sub-payload (oneof style). Classification into an
//! [`IncomingRequest`] happens in the scheduler; a raw item with zero or
//! multiple sub-payloads set is unclassifiable and never enters a bucket.

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;
use crate::op::OperationType;

/// Entity-create sub-payload for organizations, schools, and classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityPayload {
    /// Caller-side identifier, unique per entity kind.
    pub external_id: String,
    pub name: String,
    /// External id of the parent entity, where the kind requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_external_id: Option<String>,
}

/// Entity-create sub-payload for users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    pub external_id: String,
    pub name: String,
    /// External id of the user's organization.
    pub organization_external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One child entity in a link sub-payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRef {
    pub external_id: String,
    /// Human-readable name used when attributing failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Link/association sub-payload: attach `children` to the entity
/// identified by `owner_external_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPayload {
    pub owner_external_id: String,
    pub children: Vec<ChildRef>,
}

/// One caller-submitted batch item as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
    pub request_id: String,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_organization: Option<CreateEntityPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_school: Option<CreateEntityPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_class: Option<CreateEntityPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_user: Option<CreateUserPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_users_to_organization: Option<LinkPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_users_to_school: Option<LinkPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_classes_to_school: Option<LinkPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_users_to_class: Option<LinkPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_programs_to_school: Option<LinkPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_programs_to_class: Option<LinkPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_programs_to_user: Option<LinkPayload>,
}

impl RawRequest {
    /// Correlation pair for this item.
    #[must_use]
    pub fn correlation(&self) -> CorrelationId {
        CorrelationId::new(self.request_id.clone(), self.sequence)
    }

    /// The operation this item carries, if exactly one sub-payload is set.
    ///
    /// Returns `None` for both the empty and the ambiguous (multiple
    /// sub-payloads) cases; the scheduler reports the distinction.
    #[must_use]
    pub fn operation(&self) -> Option<OperationType> {
        let ops = self.present_operations();
        match ops.as_slice() {
            [one] => Some(*one),
            _ => None,
        }
    }

    /// Every operation whose sub-payload is present.
    #[must_use]
    pub fn present_operations(&self) -> Vec<OperationType> {
        let mut ops = Vec::new();
        if self.create_organization.is_some() {
            ops.push(OperationType::CreateOrganization);
        }
        if self.create_school.is_some() {
            ops.push(OperationType::CreateSchool);
        }
        if self.create_class.is_some() {
            ops.push(OperationType::CreateClass);
        }
        if self.create_user.is_some() {
            ops.push(OperationType::CreateUser);
        }
        if self.add_users_to_organization.is_some() {
            ops.push(OperationType::AddUsersToOrganization);
        }
        if self.add_users_to_school.is_some() {
            ops.push(OperationType::AddUsersToSchool);
        }
        if self.add_classes_to_school.is_some() {
            ops.push(OperationType::AddClassesToSchool);
        }
        if self.add_users_to_class.is_some() {
            ops.push(OperationType::AddUsersToClass);
        }
        if self.add_programs_to_school.is_some() {
            ops.push(OperationType::AddProgramsToSchool);
        }
        if self.add_programs_to_class.is_some() {
            ops.push(OperationType::AddProgramsToClass);
        }
        if self.add_programs_to_user.is_some() {
            ops.push(OperationType::AddProgramsToUser);
        }
        ops
    }
}

/// Normalized create request after classification.
///
/// External ids are case-folded; optional fields stay as submitted until
/// `prepare` merges duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSpec {
    pub external_id: String,
    pub name: String,
    pub parent_external_id: Option<String>,
    pub email: Option<String>,
}

/// Normalized link request after classification.
///
/// Child id lists are case-folded and de-duplicated, preserving first
/// occurrence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub owner_external_id: String,
    pub children: Vec<ChildRef>,
}

/// Typed payload of a classified request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Create(CreateSpec),
    Link(LinkSpec),
}

/// One classified batch item, immutable through the pipeline.
///
/// Stages never mutate an `IncomingRequest`; each stage returns new typed
/// values carrying resolved state forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingRequest {
    pub correlation: CorrelationId,
    pub op: OperationType,
    pub payload: Payload,
}

impl IncomingRequest {
    /// The create spec, for create operations.
    #[must_use]
    pub fn as_create(&self) -> Option<&CreateSpec> {
        match &self.payload {
            Payload::Create(spec) => Some(spec),
            Payload::Link(_) => None,
        }
    }

    /// The link spec, for link operations.
    #[must_use]
    pub fn as_link(&self) -> Option<&LinkSpec> {
        match &self.payload {
            Payload::Link(spec) => Some(spec),
            Payload::Create(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_org(request_id: &str) -> RawRequest {
        RawRequest {
            request_id: request_id.into(),
            sequence: 0,
            create_organization: Some(CreateEntityPayload {
                external_id: "org-1".into(),
                name: "District 9".into(),
                parent_external_id: None,
            }),
            ..RawRequest::default()
        }
    }

    #[test]
    fn single_payload_classifies() {
        let raw = create_org("r1");
        assert_eq!(raw.operation(), Some(OperationType::CreateOrganization));
    }

    #[test]
    fn empty_request_is_unclassifiable() {
        let raw = RawRequest {
            request_id: "r1".into(),
            ..RawRequest::default()
        };
        assert_eq!(raw.operation(), None);
        assert!(raw.present_operations().is_empty());
    }

    #[test]
    fn ambiguous_request_is_unclassifiable() {
        let mut raw = create_org("r1");
        raw.add_users_to_class = Some(LinkPayload {
            owner_external_id: "c1".into(),
            children: vec![],
        });
        assert_eq!(raw.operation(), None);
        assert_eq!(raw.present_operations().len(), 2);
    }

    #[test]
    fn correlation_uses_id_and_sequence() {
        let mut raw = create_org("r7");
        raw.sequence = 4;
        assert_eq!(raw.correlation(), CorrelationId::new("r7", 4));
    }

    #[test]
    fn raw_request_wire_shape_is_camel_case() {
        let raw = create_org("r1");
        let json = serde_json::to_value(&raw).unwrap();
        assert!(json.get("requestId").is_some());
        assert!(json["createOrganization"].get("externalId").is_some());
        // Unset sub-payloads are omitted entirely.
        assert!(json.get("createSchool").is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let raw = create_org("r1");
        let json = serde_json::to_string(&raw).unwrap();
        let back: RawRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(raw, back);
    }
}
