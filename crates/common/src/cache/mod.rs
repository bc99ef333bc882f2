//! Bounded response cache
//!
//! Small LRU over fully assembled retrieval responses, keyed by a
//! fingerprint of the query text, the caller's clearance, and the page
//! number. Lives in process memory; restarts start cold.

use crate::model::{RetrievalResponse, SecurityLevel};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Cache key: sha256 over the normalized query, clearance, and page.
///
/// Clearance participates in the key so a cached response can never leak
/// documents across security levels.
pub fn response_fingerprint(query: &str, clearance: SecurityLevel, page: u32) -> String {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.to_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update([clearance.rank()]);
    hasher.update(page.to_le_bytes());
    hex::encode(hasher.finalize())
}

struct Inner {
    map: HashMap<String, RetrievalResponse>,
    /// Recency order, least recent at the front
    order: VecDeque<String>,
}

/// LRU cache of retrieval responses
pub struct ResponseCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Look up a cached response, refreshing its recency on hit.
    pub fn get(&self, key: &str) -> Option<RetrievalResponse> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let hit = inner.map.get(key).cloned();
        match hit {
            Some(response) => {
                Self::touch(&mut inner.order, key);
                metrics::counter!("cache_hits_total").increment(1);
                tracing::debug!(key, "Response cache hit");
                Some(response)
            }
            None => {
                metrics::counter!("cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Insert a response, evicting the least recently used entry when the
    /// cache is at capacity.
    pub fn put(&self, key: String, response: RetrievalResponse) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.map.contains_key(&key) {
            inner.map.insert(key.clone(), response);
            Self::touch(&mut inner.order, &key);
            return;
        }
        if inner.map.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
                metrics::counter!("cache_evictions_total").increment(1);
                tracing::debug!(key = evicted, "Evicted least recently used response");
            }
        }
        inner.order.push_back(key.clone());
        inner.map.insert(key, response);
    }

    /// Drop every cached entry. Called after ingestion touches the corpus
    /// so stale rankings are never served.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(order: &mut VecDeque<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{LiveFetchReason, LiveFetchReport};

    fn response(query: &str) -> RetrievalResponse {
        RetrievalResponse {
            query: query.to_string(),
            clearance: SecurityLevel::Public,
            page: 1,
            results: Vec::new(),
            result_count: 0,
            hidden_count: 0,
            took_ms: 0,
            live_fetch: LiveFetchReport::skipped(false, LiveFetchReason::Disabled),
        }
    }

    #[test]
    fn test_fingerprint_varies_by_clearance_and_page() {
        let a = response_fingerprint("grid storage", SecurityLevel::Public, 1);
        let b = response_fingerprint("grid storage", SecurityLevel::Internal, 1);
        let c = response_fingerprint("grid storage", SecurityLevel::Public, 2);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_normalizes_whitespace_and_case() {
        let a = response_fingerprint("  Grid   Storage ", SecurityLevel::Public, 1);
        let b = response_fingerprint("grid storage", SecurityLevel::Public, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = ResponseCache::new(10);
        for i in 0..11 {
            cache.put(format!("key-{i}"), response(&format!("q{i}")));
        }
        assert_eq!(cache.len(), 10);
        // key-0 was least recently used and must be gone
        assert!(cache.get("key-0").is_none());
        assert!(cache.get("key-10").is_some());
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = ResponseCache::new(2);
        cache.put("a".into(), response("a"));
        cache.put("b".into(), response("b"));
        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        cache.put("c".into(), response("c"));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_hit_is_isolated_from_later_mutation() {
        let cache = ResponseCache::new(4);
        let mut original = response("grid storage");
        cache.put("a".into(), original.clone());

        // Mutating the caller's copy must not reach the stored entry
        original.result_count = 99;
        original.hidden_count = 7;
        original.query.push_str(" tampered");

        let hit = cache.get("a").unwrap();
        assert_eq!(hit.result_count, 0);
        assert_eq!(hit.hidden_count, 0);
        assert_eq!(hit.query, "grid storage");
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = ResponseCache::new(4);
        cache.put("a".into(), response("a"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
