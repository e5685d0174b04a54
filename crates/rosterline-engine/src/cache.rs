//! Read-through id-resolution cache.
//!
//! Sits in front of [`IdentityStore::lookup`] for the validate/prepare
//! stages. Positive and negative results are cached separately under the
//! same TTL; a stale negative entry self-heals on the next miss. Writes
//! are last-writer-wins; concurrent pipeline runs may race and that is
//! tolerated.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rosterline_state::{error as store_error, IdentityStore};
use rosterline_types::op::EntityKind;

struct CacheEntry {
    /// `Some` is a positive mapping, `None` a cached miss.
    value: Option<String>,
    inserted_at: Instant,
}

/// TTL cache over external→internal id lookups.
pub struct ResolveCache {
    ttl: Duration,
    entries: Mutex<HashMap<(EntityKind, String), CacheEntry>>,
}

impl ResolveCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached lookup result: `None` on miss/expiry, `Some(None)` for a
    /// cached negative, `Some(Some(id))` for a cached positive.
    #[must_use]
    pub fn get(&self, kind: EntityKind, external_id: &str) -> Option<Option<String>> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(&(kind, external_id.to_string()))?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Record a lookup result. Last writer wins.
    pub fn put(&self, kind: EntityKind, external_id: &str, value: Option<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (kind, external_id.to_string()),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Read-through resolution: cache first, then the store, caching
    /// both positive and negative results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](rosterline_state::StoreError) on storage failure.
    pub fn resolve(
        &self,
        store: &dyn IdentityStore,
        kind: EntityKind,
        external_id: &str,
    ) -> store_error::Result<Option<String>> {
        if let Some(cached) = self.get(kind, external_id) {
            return Ok(cached);
        }
        let value = store.lookup(kind, external_id)?;
        self.put(kind, external_id, value.clone());
        Ok(value)
    }
}
