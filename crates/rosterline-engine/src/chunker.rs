//! Bulk link-write chunking and dispatch.
//!
//! Link groups are merged per owner, de-duplicated, and split into
//! buckets of at most [`DEFAULT_CHUNK_CAP`] children. Buckets dispatch
//! concurrently under a semaphore. A bucket that hits an idempotency
//! conflict retries exactly once with the conflicting pairs removed;
//! conflicting children settle as already-exists verdicts attributed to
//! every correlation that requested them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use rosterline_types::correlation::CorrelationId;
use rosterline_types::error::OnboardingError;
use rosterline_types::op::LinkKind;
use rosterline_types::response::Response;

use crate::remote::{AdminGateway, RemoteError};

/// Maximum children per bulk link write.
pub const DEFAULT_CHUNK_CAP: usize = 50;

/// One child after reference resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChild {
    pub internal_id: String,
    pub external_id: String,
    pub display_name: Option<String>,
}

/// One link request after reference resolution, still carrying its
/// correlation for fan-out attribution.
#[derive(Debug, Clone)]
pub struct LinkGroup {
    pub correlation: CorrelationId,
    pub owner_external_id: String,
    pub owner_internal_id: String,
    pub children: Vec<ResolvedChild>,
}

/// One remotely-confirmed (owner, child) pair with every correlation
/// that asked for it.
#[derive(Debug, Clone)]
pub struct CommittedLink {
    pub owner_internal_id: String,
    pub child_internal_id: String,
    pub child_external_id: String,
    pub correlations: Vec<CorrelationId>,
}

/// Result of dispatching every bucket: confirmed pairs to persist plus
/// the verdicts already settled during dispatch.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub committed: Vec<CommittedLink>,
    pub failures: Vec<Response>,
}

/// Who asked for one (owner, child) pair.
#[derive(Debug, Clone)]
struct Provenance {
    correlations: Vec<CorrelationId>,
    child_external_id: String,
}

/// One bulk write unit: a single owner and at most `cap` children.
#[derive(Debug, Clone)]
struct ChunkBucket {
    owner_internal_id: String,
    children: Vec<String>,
}

/// Per-bucket dispatch verdict, attributed back through provenance.
#[derive(Debug)]
struct BucketVerdict {
    owner_internal_id: String,
    committed: Vec<String>,
    already_linked: Vec<String>,
    failed: Vec<(String, OnboardingError)>,
}

/// Merge groups per owner, de-duplicate pairs, and cut buckets of at
/// most `cap` children while recording which correlations asked for
/// each pair.
fn plan(
    groups: Vec<LinkGroup>,
    cap: usize,
) -> (Vec<ChunkBucket>, HashMap<(String, String), Provenance>) {
    let cap = cap.max(1);
    let mut provenance: HashMap<(String, String), Provenance> = HashMap::new();
    let mut per_owner: Vec<(String, Vec<String>)> = Vec::new();

    for group in groups {
        for child in group.children {
            let key = (group.owner_internal_id.clone(), child.internal_id.clone());
            match provenance.get_mut(&key) {
                Some(entry) => entry.correlations.push(group.correlation.clone()),
                None => {
                    provenance.insert(
                        key,
                        Provenance {
                            correlations: vec![group.correlation.clone()],
                            child_external_id: child.external_id,
                        },
                    );
                    match per_owner
                        .iter_mut()
                        .find(|(owner, _)| *owner == group.owner_internal_id)
                    {
                        Some((_, children)) => children.push(child.internal_id),
                        None => per_owner
                            .push((group.owner_internal_id.clone(), vec![child.internal_id])),
                    }
                }
            }
        }
    }

    let mut buckets = Vec::new();
    for (owner, children) in per_owner {
        for slice in children.chunks(cap) {
            buckets.push(ChunkBucket {
                owner_internal_id: owner.clone(),
                children: slice.to_vec(),
            });
        }
    }
    (buckets, provenance)
}

/// Dispatch every bucket and settle each (owner, child) pair exactly once.
pub async fn dispatch(
    gateway: Arc<dyn AdminGateway>,
    link: LinkKind,
    groups: Vec<LinkGroup>,
    cap: usize,
    concurrency: usize,
) -> DispatchOutcome {
    let (buckets, provenance) = plan(groups, cap);
    if buckets.is_empty() {
        return DispatchOutcome::default();
    }

    tracing::debug!(
        link = link.as_str(),
        buckets = buckets.len(),
        pairs = provenance.len(),
        "Dispatching link buckets"
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut outstanding: HashMap<usize, ChunkBucket> = buckets.into_iter().enumerate().collect();
    let mut tasks = JoinSet::new();

    for (index, bucket) in &outstanding {
        let index = *index;
        let bucket = bucket.clone();
        let gateway = gateway.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            // Closed only when the set is dropped mid-flight.
            let _permit = semaphore.acquire_owned().await;
            (index, write_bucket(gateway.as_ref(), link, bucket).await)
        });
    }

    let mut verdicts = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, verdict)) => {
                outstanding.remove(&index);
                verdicts.push(verdict);
            }
            Err(err) => {
                tracing::error!(link = link.as_str(), error = %err, "Bucket task failed to join");
            }
        }
    }
    // Buckets whose task never reported still get verdicts.
    for bucket in outstanding.into_values() {
        let err = OnboardingError::internal("BUCKET_TASK_LOST", "bulk write task did not complete");
        verdicts.push(BucketVerdict {
            owner_internal_id: bucket.owner_internal_id,
            committed: Vec::new(),
            already_linked: Vec::new(),
            failed: bucket.children.into_iter().map(|c| (c, err.clone())).collect(),
        });
    }

    settle(link, verdicts, &provenance)
}

/// Write one bucket, retrying at most once after a duplicate conflict.
async fn write_bucket(
    gateway: &dyn AdminGateway,
    link: LinkKind,
    bucket: ChunkBucket,
) -> BucketVerdict {
    let owner = bucket.owner_internal_id;
    let children = bucket.children;

    match gateway.write_links(link, &owner, &children).await {
        Ok(()) => BucketVerdict {
            owner_internal_id: owner,
            committed: children,
            already_linked: Vec::new(),
            failed: Vec::new(),
        },
        Err(RemoteError::DuplicateConflict { pairs }) => {
            let conflicting: Vec<String> = children
                .iter()
                .filter(|child| {
                    pairs
                        .iter()
                        .any(|p| p.owner_id == owner && p.child_id == **child)
                })
                .cloned()
                .collect();
            if conflicting.is_empty() {
                // The remote reported a conflict we cannot attribute to
                // any pair we sent; nothing is safe to retry.
                let err = OnboardingError::internal(
                    "CONFLICT_UNATTRIBUTED",
                    "remote reported a conflict for pairs not in this write",
                );
                return BucketVerdict {
                    owner_internal_id: owner,
                    committed: Vec::new(),
                    already_linked: Vec::new(),
                    failed: children.into_iter().map(|c| (c, err.clone())).collect(),
                };
            }

            let clean: Vec<String> = children
                .iter()
                .filter(|child| !conflicting.contains(child))
                .cloned()
                .collect();
            if clean.is_empty() {
                return BucketVerdict {
                    owner_internal_id: owner,
                    committed: Vec::new(),
                    already_linked: conflicting,
                    failed: Vec::new(),
                };
            }

            tracing::info!(
                link = link.as_str(),
                owner = owner.as_str(),
                conflicting = conflicting.len(),
                retrying = clean.len(),
                "Bulk write conflicted, retrying clean subset once"
            );
            match gateway.write_links(link, &owner, &clean).await {
                Ok(()) => BucketVerdict {
                    owner_internal_id: owner,
                    committed: clean,
                    already_linked: conflicting,
                    failed: Vec::new(),
                },
                // One retry is the bound; any second failure settles the
                // clean subset without further attempts.
                Err(retry_err) => {
                    let err = OnboardingError::internal(
                        "RETRY_FAILED",
                        format!("bulk write retry failed: {retry_err}"),
                    );
                    BucketVerdict {
                        owner_internal_id: owner,
                        committed: Vec::new(),
                        already_linked: conflicting,
                        failed: clean.into_iter().map(|c| (c, err.clone())).collect(),
                    }
                }
            }
        }
        Err(err) => {
            let onboarding = if err.is_retryable() {
                OnboardingError::remote("BULK_WRITE_FAILED", format!("bulk write failed: {err}"))
            } else {
                OnboardingError::internal("BULK_WRITE_FAILED", format!("bulk write failed: {err}"))
            };
            BucketVerdict {
                owner_internal_id: owner,
                committed: Vec::new(),
                already_linked: Vec::new(),
                failed: children.into_iter().map(|c| (c, onboarding.clone())).collect(),
            }
        }
    }
}

/// Convert bucket verdicts into committed pairs and failure Responses,
/// fanning each pair out to every correlation that requested it.
fn settle(
    link: LinkKind,
    verdicts: Vec<BucketVerdict>,
    provenance: &HashMap<(String, String), Provenance>,
) -> DispatchOutcome {
    let kind = link.child_kind();
    let mut outcome = DispatchOutcome::default();

    for verdict in verdicts {
        let owner = verdict.owner_internal_id;
        for child in verdict.committed {
            if let Some(entry) = provenance.get(&(owner.clone(), child.clone())) {
                outcome.committed.push(CommittedLink {
                    owner_internal_id: owner.clone(),
                    child_internal_id: child,
                    child_external_id: entry.child_external_id.clone(),
                    correlations: entry.correlations.clone(),
                });
            }
        }
        for child in verdict.already_linked {
            if let Some(entry) = provenance.get(&(owner.clone(), child.clone())) {
                let err = OnboardingError::already_exists(
                    "LINK_EXISTS",
                    format!(
                        "{} {} is already linked to this {}",
                        kind,
                        entry.child_external_id,
                        link.owner_kind()
                    ),
                );
                for corr in &entry.correlations {
                    outcome.failures.push(Response::failure(
                        corr.clone(),
                        kind,
                        entry.child_external_id.clone(),
                        &err,
                    ));
                }
            }
        }
        for (child, err) in verdict.failed {
            if let Some(entry) = provenance.get(&(owner.clone(), child)) {
                for corr in &entry.correlations {
                    outcome.failures.push(Response::failure(
                        corr.clone(),
                        kind,
                        entry.child_external_id.clone(),
                        &err,
                    ));
                }
            }
        }
    }

    outcome
}
