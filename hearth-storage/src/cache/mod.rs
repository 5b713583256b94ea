//! Cache adapters.
//!
//! Two implementations of [`CacheAdapter`](crate::CacheAdapter):
//!
//! - [`MemoryCache`]: process-local, `dashmap`-backed. Used in tests and
//!   single-node setups without a cache directory.
//! - [`LmdbCache`]: LMDB-backed through `heed`, survives restarts.
//!
//! Both store `serde_json::Value`s with an optional expiry and both fail
//! open: internal errors are logged and reported as misses.

pub mod glob;
pub mod lmdb;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use hearth_core::{HearthResult, StorageError};

pub use glob::GlobPattern;
pub use lmdb::{LmdbCache, LmdbCacheError};
pub use memory::MemoryCache;

use crate::adapter::CacheAdapter;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including expired entries).
    pub misses: u64,
    /// Number of live entries.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache selection loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// LMDB directory. `None` selects the in-memory cache.
    pub path: Option<PathBuf>,
    /// Maximum LMDB map size in megabytes.
    pub max_size_mb: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_size_mb: 256,
        }
    }
}

impl CacheSettings {
    /// Load settings from environment variables.
    ///
    /// - `HEARTH_CACHE_PATH`: LMDB directory (unset = in-memory cache)
    /// - `HEARTH_CACHE_MAX_MB`: LMDB map size (default: 256)
    pub fn from_env() -> Self {
        Self {
            path: std::env::var("HEARTH_CACHE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            max_size_mb: std::env::var("HEARTH_CACHE_MAX_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
        }
    }

    /// Open the configured cache.
    pub fn build(&self) -> HearthResult<Arc<dyn CacheAdapter>> {
        match &self.path {
            Some(path) => {
                let cache = LmdbCache::open(path, self.max_size_mb).map_err(|e| {
                    StorageError::CacheUnavailable {
                        reason: e.to_string(),
                    }
                })?;
                tracing::info!(path = %path.display(), "opened LMDB cache");
                Ok(Arc::new(cache))
            }
            None => {
                tracing::info!("using in-memory cache");
                Ok(Arc::new(MemoryCache::new()))
            }
        }
    }
}
