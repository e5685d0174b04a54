//! HTTP implementation of [`AdminGateway`] over `ureq`.
//!
//! `ureq` is a blocking client, so every call is moved onto the tokio
//! blocking pool. A 409 on the link endpoint carries the conflicting
//! pairs in the body and is surfaced as
//! [`RemoteError::DuplicateConflict`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use rosterline_types::op::{EntityKind, LinkKind};

use super::{
    AdminGateway, ConflictPair, RemoteCreateRequest, RemoteCreateResult, RemoteError,
};

/// Body of a 409 response on the link endpoint.
#[derive(Debug, Deserialize)]
struct ConflictBody {
    conflicts: Vec<ConflictPair>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkWriteBody<'a> {
    link: &'a str,
    owner_internal_id: &'a str,
    children_internal_ids: &'a [String],
}

/// Blocking HTTP client for the admin service.
#[derive(Clone)]
pub struct UreqAdminGateway {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqAdminGateway {
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl AdminGateway for UreqAdminGateway {
    async fn bulk_create(
        &self,
        kind: EntityKind,
        items: Vec<RemoteCreateRequest>,
    ) -> Result<Vec<RemoteCreateResult>, RemoteError> {
        let agent = self.agent.clone();
        let url = self.url(&format!("entities/{}/bulk", kind.as_str()));
        let body = serde_json::to_value(&items)
            .map_err(|e| RemoteError::Protocol(format!("request encode failed: {e}")))?;

        tokio::task::spawn_blocking(move || {
            let response = agent
                .post(&url)
                .send_json(body)
                .map_err(classify_call_error)?;
            response
                .into_json::<Vec<RemoteCreateResult>>()
                .map_err(|e| RemoteError::Protocol(format!("response decode failed: {e}")))
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("blocking task failed: {e}")))?
    }

    async fn write_links(
        &self,
        link: LinkKind,
        owner_internal: &str,
        children_internal: &[String],
    ) -> Result<(), RemoteError> {
        let agent = self.agent.clone();
        let url = self.url("links/bulk");
        let body = serde_json::to_value(LinkWriteBody {
            link: link.as_str(),
            owner_internal_id: owner_internal,
            children_internal_ids: children_internal,
        })
        .map_err(|e| RemoteError::Protocol(format!("request encode failed: {e}")))?;

        tokio::task::spawn_blocking(move || {
            match agent.post(&url).send_json(body) {
                Ok(_) => Ok(()),
                Err(ureq::Error::Status(409, response)) => {
                    let conflicts = response
                        .into_json::<ConflictBody>()
                        .map_err(|e| {
                            RemoteError::Protocol(format!("conflict body decode failed: {e}"))
                        })?;
                    Err(RemoteError::DuplicateConflict {
                        pairs: conflicts.conflicts,
                    })
                }
                Err(other) => Err(classify_call_error(other)),
            }
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("blocking task failed: {e}")))?
    }
}

fn classify_call_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_string()
                .unwrap_or_else(|_| String::from("<unreadable body>"));
            RemoteError::Protocol(format!("unexpected status {code}: {detail}"))
        }
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            if message.contains("timed out") {
                RemoteError::Timeout
            } else {
                RemoteError::Transport(message)
            }
        }
    }
}
