//!
//! Thinking-signature cache for the Cloud Code proxy.
//!
//! A small, process-local store of opaque model-issued signatures, keyed two
//! ways: by the tool-use id that produced them, and by a coarser model-family
//! string used as a last-resort fallback. The upstream requires these
//! signatures to be replayed on a follow-up turn; clients frequently strip
//! them, so the proxy fills the gap.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/* --- constants --------------------------------------------------------------------------------*/

/** Signatures shorter than this are rejected at `put` as noise, not real signatures. */
pub const MIN_SIGNATURE_LEN: usize = 8;

/** Total entries kept per namespace before least-recently-inserted eviction. */
pub const MAX_CACHE_ENTRIES: usize = 1024;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Bounded, insertion-ordered key/value store used for one cache namespace.
///
/// Eviction is least-recently-inserted, not least-recently-used: a `get` does
/// not refresh position, matching the simple LRU-by-insertion bound the
/// signature cache calls for.
#[derive(Debug, Default)]
struct LruStore {
    map: HashMap<String, String>,
    order: VecDeque<String>,
}

impl LruStore {
    fn put(&mut self, key: String, value: String) {
        if self.map.insert(key.clone(), value).is_some() {
            if let Some(pos) = self.order.iter().position(|k| k == &key) {
                self.order.remove(pos);
            }
        } else if self.map.len() > MAX_CACHE_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(key);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }
}

///
/// Two-namespace signature cache: by tool-use id, and by model family.
///
/// Safe to read and write concurrently; each namespace is guarded by its own
/// short-lived mutex, and no I/O ever happens inside the critical section.
#[derive(Default)]
pub struct SignatureCache {
    by_tool_id: Mutex<LruStore>,
    by_model_family: Mutex<LruStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/* --- start of code -------------------------------------------------------------------------- */

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a signature under a tool-use id. Rejected silently if too short.
    pub fn put_by_tool_id(&self, tool_use_id: &str, signature: &str) {
        if signature.len() < MIN_SIGNATURE_LEN {
            return;
        }
        self.by_tool_id.lock().unwrap().put(tool_use_id.to_string(), signature.to_string());
    }

    /// Store a signature under a model-family string. Rejected silently if too short.
    pub fn put_by_model_family(&self, model_family: &str, signature: &str) {
        if signature.len() < MIN_SIGNATURE_LEN {
            return;
        }
        self.by_model_family.lock().unwrap().put(model_family.to_string(), signature.to_string());
    }

    /// Look up a signature by tool-use id, recording a hit or miss.
    pub fn get_by_tool_id(&self, tool_use_id: &str) -> Option<String> {
        let found = self.by_tool_id.lock().unwrap().get(tool_use_id);
        self.record(found.is_some());
        found
    }

    /// Look up a signature by model family, recording a hit or miss.
    pub fn get_by_model_family(&self, model_family: &str) -> Option<String> {
        let found = self.by_model_family.lock().unwrap().get(model_family);
        self.record(found.is_some());
        found
    }

    /// Resolve a signature for a tool-use block: id match first, model-family fallback second.
    pub fn resolve(&self, tool_use_id: &str, model_family: &str) -> Option<String> {
        self.get_by_tool_id(tool_use_id).or_else(|| self.get_by_model_family(model_family))
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current (hits, misses) counters, for observability.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_signatures() {
        let cache = SignatureCache::new();
        cache.put_by_tool_id("tool-1", "short");
        assert_eq!(cache.get_by_tool_id("tool-1"), None);
    }

    #[test]
    fn stores_and_resolves_by_tool_id() {
        let cache = SignatureCache::new();
        cache.put_by_tool_id("tool-1", "ABCDEFGH12");
        assert_eq!(cache.resolve("tool-1", "gemini-3"), Some("ABCDEFGH12".to_string()));
    }

    #[test]
    fn falls_back_to_model_family_when_tool_id_absent() {
        let cache = SignatureCache::new();
        cache.put_by_model_family("gemini-3", "FAMILYSIGNATURE");
        assert_eq!(cache.resolve("unknown-tool", "gemini-3"), Some("FAMILYSIGNATURE".to_string()));
    }

    #[test]
    fn evicts_least_recently_inserted_past_bound() {
        let mut store = LruStore::default();
        for i in 0..MAX_CACHE_ENTRIES + 1 {
            store.put(format!("k{i}"), format!("v{i}"));
        }
        assert_eq!(store.map.len(), MAX_CACHE_ENTRIES);
        assert_eq!(store.get("k0"), None);
        assert_eq!(store.get(&format!("k{MAX_CACHE_ENTRIES}")), Some(format!("v{MAX_CACHE_ENTRIES}")));
    }

    #[test]
    fn tracks_hit_miss_counters() {
        let cache = SignatureCache::new();
        cache.put_by_tool_id("tool-1", "ABCDEFGH12");
        let _ = cache.get_by_tool_id("tool-1");
        let _ = cache.get_by_tool_id("missing");
        let (hits, misses) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }
}
