//! LMDB-backed cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes LE millis, 0 = never][json value]`
//!
//! Expired entries are reported as misses and removed on the read that
//! notices them.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde_json::Value as JsonValue;

use super::glob::GlobPattern;
use super::CacheStats;
use crate::adapter::CacheAdapter;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const NEVER: i64 = 0;

/// LMDB cache implementing [`CacheAdapter`].
pub struct LmdbCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LmdbCache {
    /// Open (or create) an LMDB cache in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the map in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self
            .env
            .read_txn()
            .ok()
            .and_then(|rtxn| self.db.len(&rtxn).ok())
            .unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
        }
    }

    fn encode(value: &JsonValue, ttl: Option<Duration>) -> Result<Vec<u8>, LmdbCacheError> {
        // A TTL too large to represent never expires.
        let expires_at = ttl
            .and_then(|ttl| i64::try_from(ttl.as_millis()).ok())
            .and_then(|ttl| Utc::now().timestamp_millis().checked_add(ttl))
            .unwrap_or(NEVER);
        let value_bytes =
            serde_json::to_vec(value).map_err(|e| LmdbCacheError::Corrupt(e.to_string()))?;

        let mut bytes = Vec::with_capacity(8 + value_bytes.len());
        bytes.extend_from_slice(&expires_at.to_le_bytes());
        bytes.extend_from_slice(&value_bytes);
        Ok(bytes)
    }

    /// Decode an envelope. `Ok(None)` means the entry has expired.
    fn decode(bytes: &[u8], now_millis: i64) -> Result<Option<JsonValue>, LmdbCacheError> {
        if bytes.len() < 8 {
            return Err(LmdbCacheError::Corrupt("truncated envelope".into()));
        }
        let expiry_bytes: [u8; 8] = bytes[0..8]
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt("invalid expiry".into()))?;
        let expires_at = i64::from_le_bytes(expiry_bytes);
        if expires_at != NEVER && expires_at <= now_millis {
            return Ok(None);
        }
        serde_json::from_slice(&bytes[8..])
            .map(Some)
            .map_err(|e| LmdbCacheError::Corrupt(e.to_string()))
    }

    fn try_get(&self, key: &str) -> Result<Option<JsonValue>, LmdbCacheError> {
        let decoded = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            match self
                .db
                .get(&rtxn, key.as_bytes())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            {
                Some(bytes) => Some(Self::decode(bytes, Utc::now().timestamp_millis())),
                None => None,
            }
        };

        match decoded {
            None => Ok(None),
            Some(Ok(Some(value))) => Ok(Some(value)),
            Some(Ok(None)) => {
                self.try_delete(&[key.to_string()])?;
                Ok(None)
            }
            Some(Err(e)) => {
                // Corrupt entries are dropped so the next read repopulates them.
                self.try_delete(&[key.to_string()])?;
                Err(e)
            }
        }
    }

    fn try_set(&self, key: &str, value: &JsonValue, ttl: Option<Duration>) -> Result<(), LmdbCacheError> {
        let bytes = Self::encode(value, ttl)?;
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))
    }

    /// Delete keys in one write transaction, counting live entries removed.
    fn try_delete(&self, keys: &[String]) -> Result<u64, LmdbCacheError> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in keys {
            let live = matches!(
                self.db.get(&wtxn, key.as_bytes()),
                Ok(Some(bytes)) if matches!(Self::decode(bytes, now), Ok(Some(_)))
            );
            if self
                .db
                .delete(&mut wtxn, key.as_bytes())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
                && live
            {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(deleted)
    }

    fn collect_matching_keys(&self, glob: &GlobPattern) -> Result<Vec<String>, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for result in iter {
            let Ok((key, _)) = result else { continue };
            if let Ok(key) = std::str::from_utf8(key) {
                if glob.matches(key) {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheAdapter for LmdbCache {
    async fn get(&self, key: &str) -> Option<JsonValue> {
        match self.try_get(key) {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "lmdb cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &JsonValue, ttl: Option<Duration>) -> bool {
        match self.try_set(key, value, ttl) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "lmdb cache write failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.delete_many(&[key.to_string()]).await > 0
    }

    async fn delete_many(&self, keys: &[String]) -> u64 {
        self.try_delete(keys).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "lmdb cache delete failed");
            0
        })
    }

    async fn delete_pattern(&self, pattern: &str) -> u64 {
        let Some(glob) = GlobPattern::new(pattern) else {
            tracing::warn!(pattern, "invalid cache pattern");
            return 0;
        };
        let keys = match self.collect_matching_keys(&glob) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "lmdb cache scan failed");
                return 0;
            }
        };
        self.delete_many(&keys).await
    }

    fn is_ready(&self) -> bool {
        // The environment is open for the lifetime of the value.
        true
    }

    async fn await_ready(&self, _timeout: Duration) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_cache() -> (LmdbCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cache = LmdbCache::open(temp_dir.path(), 10).expect("Failed to open cache");
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _temp_dir) = create_test_cache();
        let row = json!({"id": 3, "license": "license:abc"});

        assert!(cache.set("user:license:abc", &row, None).await);
        assert_eq!(cache.get("user:license:abc").await, Some(row));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.get("user:nobody").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let (cache, _temp_dir) = create_test_cache();
        cache
            .set("penalty:1", &json!({"id": 1}), Some(Duration::from_millis(1)))
            .await;
        std::thread::sleep(std::time::Duration::from_millis(10));

        assert!(cache.get("penalty:1").await.is_none());
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.set("user:a", &json!(1), Some(Duration::MAX)).await);
        assert_eq!(cache.get("user:a").await, Some(json!(1)));

        let bytes = LmdbCache::encode(&json!(1), Some(Duration::from_millis(u64::MAX))).unwrap();
        assert_eq!(LmdbCache::decode(&bytes, i64::MAX).unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_delete_pattern_scoped_to_prefix() {
        let (cache, _temp_dir) = create_test_cache();
        for key in ["character:1", "character:1:full", "character:2:user", "user:a"] {
            cache.set(key, &json!(true), None).await;
        }

        assert_eq!(cache.delete_pattern("character:*").await, 3);
        assert!(cache.get("user:a").await.is_some());
        assert!(cache.get("character:1").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (cache, _temp_dir) = create_test_cache();
        cache.set("log:1", &json!(1), None).await;
        assert!(cache.delete("log:1").await);
        assert!(!cache.delete("log:1").await);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        {
            let cache = LmdbCache::open(temp_dir.path(), 10).unwrap();
            cache.set("user:a", &json!({"id": 1}), None).await;
        }
        let cache = LmdbCache::open(temp_dir.path(), 10).unwrap();
        assert_eq!(cache.get("user:a").await, Some(json!({"id": 1})));
    }
}
