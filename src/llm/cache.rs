// ============================================
// PROMPTGATE - Response Cache
// ============================================

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

use super::types::NormalizedResponse;

/// Storage boundary for cached responses.
///
/// The in-memory [`ResponseCache`] is the default; an external key-value
/// store can be plugged in by implementing this trait. Implementations must
/// treat entries older than their TTL as absent.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<NormalizedResponse>;
    async fn put(&self, key: String, value: NormalizedResponse, ttl: Duration);
    async fn remove(&self, key: &str);
    async fn clear(&self);
    fn stats(&self) -> CacheStats;
}

/// Cache entry with TTL
struct CacheEntry {
    value: NormalizedResponse,
    created_at: Instant,
    ttl: Duration,
    hits: u32,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// In-memory TTL cache for normalized responses
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Get cached response if exists and not expired
    pub fn lookup(&self, key: &str) -> Option<NormalizedResponse> {
        let mut entries = self.entries.write().ok()?;

        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired() {
                entry.hits += 1;
                return Some(entry.value.clone());
            }
            // Expired, remove it
            entries.remove(key);
        }
        None
    }

    /// Store response in cache, replacing any previous value for the key
    pub fn store(&self, key: String, value: NormalizedResponse, ttl: Duration) {
        if let Ok(mut entries) = self.entries.write() {
            if !entries.contains_key(&key) && entries.len() >= self.max_entries {
                Self::evict_one(&mut entries);
            }

            entries.insert(
                key,
                CacheEntry {
                    value,
                    created_at: Instant::now(),
                    ttl,
                    hits: 0,
                },
            );
        }
    }

    /// Evict an expired entry if any, otherwise the least used one
    fn evict_one(entries: &mut HashMap<String, CacheEntry>) {
        if let Some(key_to_remove) = entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                let a_expired = a.is_expired();
                let b_expired = b.is_expired();

                if a_expired != b_expired {
                    return b_expired.cmp(&a_expired);
                }

                a.hits.cmp(&b.hits)
            })
            .map(|(key, _)| key.clone())
        {
            entries.remove(&key_to_remove);
        }
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        if let Ok(mut entries) = self.entries.write() {
            let before = entries.len();
            entries.retain(|_, e| !e.is_expired());
            before - entries.len()
        } else {
            0
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn snapshot(&self) -> CacheStats {
        if let Ok(entries) = self.entries.read() {
            CacheStats {
                total_entries: entries.len(),
                total_hits: entries.values().map(|e| e.hits).sum(),
                expired_entries: entries.values().filter(|e| e.is_expired()).count(),
                max_entries: self.max_entries,
            }
        } else {
            CacheStats::default()
        }
    }
}

#[async_trait]
impl CacheBackend for ResponseCache {
    async fn get(&self, key: &str) -> Option<NormalizedResponse> {
        self.lookup(key)
    }

    async fn put(&self, key: String, value: NormalizedResponse, ttl: Duration) {
        self.store(key, value, ttl);
    }

    async fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    async fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn stats(&self) -> CacheStats {
        self.snapshot()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: u32,
    pub expired_entries: usize,
    pub max_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;

    fn response(content: &str) -> NormalizedResponse {
        NormalizedResponse {
            provider_id: "openai".into(),
            model: "gpt-4o".into(),
            content: content.into(),
            token_usage: TokenUsage::new(3, 4, None),
            raw: serde_json::json!({ "id": content }),
        }
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = ResponseCache::new(10);
        cache
            .put("k1".into(), response("Hi there!"), Duration::from_secs(60))
            .await;

        assert_eq!(cache.get("k1").await, Some(response("Hi there!")));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = ResponseCache::new(10);
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_removed_on_read() {
        let cache = ResponseCache::new(10);
        cache.store("k".into(), response("old"), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.lookup("k").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lookup("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_fresh_at_exactly_ttl() {
        let cache = ResponseCache::new(10);
        cache
            .put("k".into(), response("edge"), Duration::from_secs(5))
            .await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k").await, Some(response("edge")));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_is_per_entry() {
        let cache = ResponseCache::new(10);
        cache.store("short".into(), response("a"), Duration::from_secs(1));
        cache.store("long".into(), response("b"), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lookup("short").is_none());
        assert!(cache.lookup("long").is_some());
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = ResponseCache::new(10);
        cache.store("k".into(), response("first"), Duration::from_secs(60));
        cache.store("k".into(), response("second"), Duration::from_secs(60));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("k").map(|r| r.content), Some("second".into()));
    }

    #[test]
    fn test_eviction_prefers_least_used() {
        let cache = ResponseCache::new(2);
        cache.store("hot".into(), response("hot"), Duration::from_secs(60));
        cache.store("cold".into(), response("cold"), Duration::from_secs(60));
        cache.lookup("hot");

        cache.store("new".into(), response("new"), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("hot").is_some());
        assert!(cache.lookup("cold").is_none());
        assert!(cache.lookup("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_purge() {
        let cache = ResponseCache::new(10);
        cache.store("a".into(), response("a"), Duration::from_secs(1));
        cache.store("b".into(), response("b"), Duration::from_secs(60));
        cache.lookup("b");

        tokio::time::advance(Duration::from_secs(2)).await;
        let stats = cache.snapshot();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.total_hits, 1);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
