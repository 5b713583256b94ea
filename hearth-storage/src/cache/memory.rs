//! In-process cache backed by `dashmap`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::time::Instant;

use super::glob::GlobPattern;
use super::CacheStats;
use crate::adapter::CacheAdapter;

#[derive(Debug, Clone)]
struct Entry {
    value: JsonValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory cache with per-entry expiry.
///
/// Readiness and availability can be toggled, which lets tests simulate a
/// cache that has not connected yet or one that fails mid-flight (every
/// operation then behaves as a miss).
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    ready: AtomicBool,
    available: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            ready: AtomicBool::new(true),
            available: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Start in the not-ready state.
    pub fn not_ready() -> Self {
        let cache = Self::new();
        cache.set_ready(false);
        cache
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Simulate an outage: while unavailable every call fails open.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Peek at a live entry without touching hit/miss counters.
    pub fn peek(&self, key: &str) -> Option<JsonValue> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.keys().len() as u64,
        }
    }

    fn is_available(&self) -> bool {
        if self.available.load(Ordering::SeqCst) {
            true
        } else {
            tracing::warn!("memory cache unavailable, treating call as miss");
            false
        }
    }
}

#[async_trait]
impl CacheAdapter for MemoryCache {
    async fn get(&self, key: &str) -> Option<JsonValue> {
        if !self.is_available() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let now = Instant::now();
        let live = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match live {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                // Expired: drop it lazily.
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &JsonValue, ttl: Option<Duration>) -> bool {
        if !self.is_available() {
            return false;
        }
        // A TTL past the clock's range never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        true
    }

    async fn delete(&self, key: &str) -> bool {
        if !self.is_available() {
            return false;
        }
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now))
    }

    async fn delete_many(&self, keys: &[String]) -> u64 {
        let mut deleted = 0;
        for key in keys {
            if self.delete(key).await {
                deleted += 1;
            }
        }
        deleted
    }

    async fn delete_pattern(&self, pattern: &str) -> u64 {
        if !self.is_available() {
            return 0;
        }
        let Some(glob) = GlobPattern::new(pattern) else {
            tracing::warn!(pattern, "invalid cache pattern");
            return 0;
        };

        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| glob.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let now = Instant::now();
        matching
            .iter()
            .filter(|key| {
                self.entries
                    .remove(key.as_str())
                    .is_some_and(|(_, entry)| entry.is_live(now))
            })
            .count() as u64
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn await_ready(&self, timeout: Duration) -> bool {
        let policy = hearth_core::RetryPolicy::fixed(Duration::from_millis(10), u32::MAX);
        policy
            .wait_until(timeout, || async { self.is_ready() })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert!(cache.set("user:a", &json!({"id": 1}), None).await);
        assert_eq!(cache.get("user:a").await, Some(json!({"id": 1})));

        assert!(cache.delete("user:a").await);
        assert_eq!(cache.get("user:a").await, None);
        assert!(!cache.delete("user:a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("penalty:1", &json!({"id": 1}), Some(Duration::from_secs(5)))
            .await;
        assert!(cache.get("penalty:1").await.is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("penalty:1").await.is_none());
        assert!(cache.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_never_expires() {
        let cache = MemoryCache::new();
        assert!(cache.set("user:a", &json!(1), Some(Duration::MAX)).await);

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get("user:a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_delete_many_and_pattern() {
        let cache = MemoryCache::new();
        for key in ["character:1", "character:1:full", "character:2", "user:a"] {
            cache.set(key, &json!(true), None).await;
        }

        let deleted = cache
            .delete_many(&["character:2".to_string(), "character:9".to_string()])
            .await;
        assert_eq!(deleted, 1);

        assert_eq!(cache.delete_pattern("character:*").await, 2);
        assert_eq!(cache.keys(), vec!["user:a".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_cache_fails_open() {
        let cache = MemoryCache::new();
        cache.set("user:a", &json!(1), None).await;

        cache.set_available(false);
        assert_eq!(cache.get("user:a").await, None);
        assert!(!cache.set("user:b", &json!(2), None).await);
        assert_eq!(cache.delete_pattern("user:*").await, 0);

        cache.set_available(true);
        assert_eq!(cache.get("user:a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = MemoryCache::new();
        cache.set("k", &json!(1), None).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_ready_times_out() {
        let cache = MemoryCache::not_ready();
        assert!(!cache.await_ready(Duration::from_millis(100)).await);

        cache.set_ready(true);
        assert!(cache.await_ready(Duration::from_millis(100)).await);
    }
}
