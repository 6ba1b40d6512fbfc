//! In-process TTL key set backed by DashMap for lock-free concurrent access.
//! Remembers recently seen keys (webhook payload hashes, message ids) so
//! platform retries are short-circuited.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Rolling window of seen keys.
pub struct SeenCache {
    store: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
    max_entries: usize,
}

impl SeenCache {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            store: DashMap::with_capacity(max_entries.min(4096)),
            ttl: i64::try_from(ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            max_entries,
        }
    }

    /// Records `key` as seen at `now`. Returns `true` the first time a key
    /// is seen inside the window, `false` for a repeat.
    pub fn check_and_insert(&self, key: &str, now: DateTime<Utc>) -> bool {
        if self.store.len() >= self.max_entries {
            self.evict_expired(now);
        }
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut seen) => {
                if now - *seen.get() > self.ttl {
                    seen.insert(now);
                    true
                } else {
                    metrics::counter!("dedup.hit").increment(1);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    pub fn contains(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.store
            .get(key)
            .is_some_and(|seen| now - *seen <= self.ttl)
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.store.len();
        self.store.retain(|_, seen| now - *seen <= self.ttl);
        before - self.store.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
