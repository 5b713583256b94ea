//! Storage configuration

use std::time::Duration;

use crate::error::{ConfigError, HearthResult};

/// Fallback TTL for cached entries when a storage does not override it.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Immutable configuration for one storage instance.
///
/// `name` identifies the storage in the registry and `cache_prefix`
/// namespaces every cache key the storage writes. Both are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    name: String,
    cache_prefix: String,
    default_ttl: Duration,
    enable_cache: bool,
}

impl StorageConfig {
    /// Create a configuration with the default TTL and caching enabled.
    ///
    /// Fails if `name` or `cache_prefix` is empty.
    pub fn new(name: impl Into<String>, cache_prefix: impl Into<String>) -> HearthResult<Self> {
        let name = name.into();
        let cache_prefix = cache_prefix.into();

        if name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "name".to_string(),
            }
            .into());
        }
        if cache_prefix.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache_prefix".to_string(),
            }
            .into());
        }

        Ok(Self {
            name,
            cache_prefix,
            default_ttl: DEFAULT_TTL,
            enable_cache: true,
        })
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Enable or disable caching.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_prefix(&self) -> &str {
        &self.cache_prefix
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn cache_enabled(&self) -> bool {
        self.enable_cache
    }
}
