//! In-process implementation of [`StreamBroker`].
//!
//! Each stream is an append-only log; each consumer group tracks a
//! delivery cursor plus a pending table of delivered-but-unacknowledged
//! messages. Claiming reassigns a pending entry to the claiming consumer
//! and bumps its delivery count, which gives at-least-once semantics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::broker::{MessageId, StreamBroker, StreamMessage};
use crate::error::{self, BrokerError};
use crate::stream::StreamKey;

struct Entry {
    id: MessageId,
    payload: String,
}

struct Pending {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Default)]
struct GroupState {
    /// Index into the stream log of the next fresh entry for this group.
    cursor: usize,
    pending: HashMap<MessageId, Pending>,
}

#[derive(Default)]
struct StreamState {
    next_id: u64,
    entries: Vec<Entry>,
    groups: HashMap<String, GroupState>,
}

/// In-memory stream broker for local runs and tests.
#[derive(Default)]
pub struct InMemoryBroker {
    streams: Mutex<HashMap<StreamKey, StreamState>>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_stream<T>(
        &self,
        stream: StreamKey,
        f: impl FnOnce(&mut StreamState) -> T,
    ) -> error::Result<T> {
        let mut streams = self.streams.lock().map_err(|_| BrokerError::LockPoisoned)?;
        Ok(f(streams.entry(stream).or_default()))
    }

    /// Number of entries appended to a stream (read or not).
    pub fn stream_len(&self, stream: StreamKey) -> error::Result<usize> {
        self.with_stream(stream, |state| state.entries.len())
    }

    /// Number of delivered-but-unacknowledged messages for a group.
    pub fn pending_len(&self, stream: StreamKey, group: &str) -> error::Result<usize> {
        self.with_stream(stream, |state| {
            state.groups.get(group).map_or(0, |g| g.pending.len())
        })
    }
}

impl StreamBroker for InMemoryBroker {
    fn append(&self, stream: StreamKey, payload: &str) -> error::Result<MessageId> {
        self.with_stream(stream, |state| {
            let id = MessageId::new(format!("{}-{}", stream.as_str(), state.next_id));
            state.next_id += 1;
            state.entries.push(Entry {
                id: id.clone(),
                payload: payload.to_string(),
            });
            id
        })
    }

    fn read_new(
        &self,
        stream: StreamKey,
        group: &str,
        consumer: &str,
        max: usize,
    ) -> error::Result<Vec<StreamMessage>> {
        self.with_stream(stream, |state| {
            let group_state = state.groups.entry(group.to_string()).or_default();
            let mut messages = Vec::new();
            while group_state.cursor < state.entries.len() && messages.len() < max {
                let entry = &state.entries[group_state.cursor];
                group_state.cursor += 1;
                group_state.pending.insert(
                    entry.id.clone(),
                    Pending {
                        consumer: consumer.to_string(),
                        delivered_at: Instant::now(),
                        delivery_count: 1,
                    },
                );
                messages.push(StreamMessage {
                    id: entry.id.clone(),
                    payload: entry.payload.clone(),
                    delivery_count: 1,
                });
            }
            messages
        })
    }

    fn claim_stale(
        &self,
        stream: StreamKey,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> error::Result<Vec<StreamMessage>> {
        self.with_stream(stream, |state| {
            let Some(group_state) = state.groups.get_mut(group) else {
                return Vec::new();
            };
            let mut messages = Vec::new();
            // Walk the log in append order so reclaim preserves rough
            // delivery order for stale messages.
            for entry in &state.entries {
                if messages.len() >= max {
                    break;
                }
                let Some(pending) = group_state.pending.get_mut(&entry.id) else {
                    continue;
                };
                if pending.delivered_at.elapsed() < min_idle {
                    continue;
                }
                pending.consumer = consumer.to_string();
                pending.delivered_at = Instant::now();
                pending.delivery_count += 1;
                messages.push(StreamMessage {
                    id: entry.id.clone(),
                    payload: entry.payload.clone(),
                    delivery_count: pending.delivery_count,
                });
            }
            messages
        })
    }

    fn ack(&self, stream: StreamKey, group: &str, id: &MessageId) -> error::Result<bool> {
        self.with_stream(stream, |state| {
            state
                .groups
                .get_mut(group)
                .is_some_and(|g| g.pending.remove(id).is_some())
        })
    }
}
