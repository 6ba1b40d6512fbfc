//! Short-window duplicate suppression for platform retries.

use chrono::{DateTime, Utc};
use messenger_cache::SeenCache;
use sha2::{Digest, Sha256};

const MAX_TRACKED: usize = 100_000;

/// Two windows: whole payloads by content hash, and individual message or
/// comment ids.
pub struct InboundDedup {
    payloads: SeenCache,
    units: SeenCache,
}

impl InboundDedup {
    pub fn new(window_secs: u64) -> Self {
        Self {
            payloads: SeenCache::new(window_secs, MAX_TRACKED),
            units: SeenCache::new(window_secs, MAX_TRACKED),
        }
    }

    pub fn is_duplicate_payload(&self, raw: &[u8], now: DateTime<Utc>) -> bool {
        let key = hex::encode(Sha256::digest(raw));
        !self.payloads.check_and_insert(&key, now)
    }

    pub fn is_duplicate_message(&self, page_id: &str, message_id: &str, now: DateTime<Utc>) -> bool {
        !self.units.check_and_insert(&format!("{page_id}:{message_id}"), now)
    }

    pub fn is_duplicate_comment(&self, comment_id: &str, now: DateTime<Utc>) -> bool {
        !self.units.check_and_insert(&format!("comment:{comment_id}"), now)
    }

    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        self.payloads.evict_expired(now) + self.units.evict_expired(now)
    }
}
