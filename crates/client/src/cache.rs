//! Short-TTL memoization of read results.
//!
//! Successful JSON GET responses are remembered for a few minutes so
//! repeated reads during a browsing session skip the network entirely.
//! Expiry is checked lazily at read time; unread stale entries stay in
//! memory until their next lookup, a prefix invalidation, or a clear.
//!
//! Only the request executor's success path inserts entries. Binary
//! responses and non-GET verbs are never cached.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Entry stored in the cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    inserted_at: Instant,
}

/// Key/value store of recent successful read results with expiry.
pub struct ResponseCache<C: Clock = SystemClock> {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: C,
}

impl ResponseCache<SystemClock> {
    /// Cache with the given TTL on the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C: Clock> ResponseCache<C> {
    /// Cache with an injected clock (test support).
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl, clock }
    }

    /// Look up a live entry, lazily evicting it if past TTL.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                debug!(key, "cache hit");
                Some(entry.payload.clone())
            }
            Some(_) => {
                debug!(key, "cache entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remember a read result under its canonical key.
    pub fn insert(&self, key: String, payload: Value) {
        let entry = CacheEntry { payload, inserted_at: self.clock.now() };
        self.entries.write().insert(key, entry);
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Called by the executor after a successful mutation so related reads
    /// observe fresh data.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(prefix, evicted, "cache invalidated by prefix");
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of entries currently held, including unread stale ones.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_manual_clock(ttl_secs: u64) -> (ResponseCache<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let cache = ResponseCache::with_clock(Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn live_entry_is_served() {
        let (cache, _clock) = cache_with_manual_clock(300);
        cache.insert("/machines".into(), json!([1, 2]));
        assert_eq!(cache.get("/machines"), Some(json!([1, 2])));
    }

    #[test]
    fn expired_entry_is_evicted_on_lookup() {
        let (cache, clock) = cache_with_manual_clock(300);
        cache.insert("/machines".into(), json!([1]));

        clock.advance(Duration::from_secs(301));
        assert_eq!(cache.get("/machines"), None);
        // lazy eviction removed it
        assert!(cache.is_empty());
    }

    #[test]
    fn unread_stale_entries_linger_until_looked_up() {
        let (cache, clock) = cache_with_manual_clock(300);
        cache.insert("/a".into(), json!(1));
        cache.insert("/b".into(), json!(2));

        clock.advance(Duration::from_secs(301));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("/a"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn prefix_invalidation_spares_unrelated_keys() {
        let (cache, _clock) = cache_with_manual_clock(300);
        cache.insert("/work-entries?page=1".into(), json!([]));
        cache.insert("/work-entries?page=2".into(), json!([]));
        cache.insert("/products".into(), json!([]));

        cache.invalidate_prefix("/work-entries");
        assert_eq!(cache.get("/work-entries?page=1"), None);
        assert_eq!(cache.get("/work-entries?page=2"), None);
        assert_eq!(cache.get("/products"), Some(json!([])));
    }

    #[test]
    fn entry_just_under_ttl_still_serves() {
        let (cache, clock) = cache_with_manual_clock(300);
        cache.insert("/x".into(), json!(true));
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("/x"), Some(json!(true)));
    }

    #[test]
    fn clear_drops_everything() {
        let (cache, _clock) = cache_with_manual_clock(300);
        cache.insert("/x".into(), json!(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
