//! Cache-aside storage primitive.
//!
//! [`BaseStorage`] owns one [`StorageConfig`] and a pair of adapters. Reads
//! check the cache first and populate it on a miss. Writes hit the database
//! first and then adjust the cache: a write-through when the caller hands
//! over the new row, a delete otherwise.
//!
//! There is no transaction spanning the database write and the cache
//! adjustment. A crash between the two leaves the old cache entry in place
//! until its TTL expires.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use hearth_core::{
    row_str, CacheKey, HealthCheck, HearthResult, Params, Row, StorageConfig, StorageError,
};
use serde_json::Value as JsonValue;

use crate::adapter::{CacheAdapter, DatabaseAdapter};

/// Options for [`BaseStorage::get`] and [`BaseStorage::get_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub ttl: Option<Duration>,
    pub suffix: Option<&'static str>,
    /// Bypass the cache lookup. The fresh row is still written through.
    pub force_db: bool,
}

impl ReadOptions {
    pub fn suffix(suffix: &'static str) -> Self {
        Self {
            suffix: Some(suffix),
            ..Self::default()
        }
    }

    pub fn force_db() -> Self {
        Self {
            force_db: true,
            ..Self::default()
        }
    }
}

/// Options for [`BaseStorage::create`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOptions {
    /// Row to seed the cache with. Nothing is cached when absent.
    pub cache_data: Option<Row>,
    /// Cache identifier override. Defaults to the generated id.
    pub identifier: Option<String>,
    pub ttl: Option<Duration>,
    pub suffix: Option<&'static str>,
}

/// Options for [`BaseStorage::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Post-update row. Written to the cache instead of invalidating.
    pub new_data: Option<Row>,
    /// Always invalidate, even when `new_data` is present.
    pub invalidate_only: bool,
    pub ttl: Option<Duration>,
    pub suffix: Option<&'static str>,
}

impl UpdateOptions {
    pub fn write_through(row: Row) -> Self {
        Self {
            new_data: Some(row),
            ..Self::default()
        }
    }

    pub fn invalidate() -> Self {
        Self {
            invalidate_only: true,
            ..Self::default()
        }
    }
}

/// Options for [`BaseStorage::delete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub suffix: Option<&'static str>,
}

/// Options for the custom query helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub ttl: Option<Duration>,
    /// Never read or write the cache.
    pub skip_cache: bool,
}

impl QueryOptions {
    pub fn uncached() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }
}

/// Options for direct cache access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    pub suffix: Option<&'static str>,
}

/// Generic cache-aside data access shared by every domain storage.
#[derive(Clone)]
pub struct BaseStorage {
    config: StorageConfig,
    db: Arc<dyn DatabaseAdapter>,
    cache: Arc<dyn CacheAdapter>,
    identifier_field: Option<&'static str>,
}

impl std::fmt::Debug for BaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseStorage")
            .field("config", &self.config)
            .field("identifier_field", &self.identifier_field)
            .finish_non_exhaustive()
    }
}

impl BaseStorage {
    pub fn new(
        config: StorageConfig,
        db: Arc<dyn DatabaseAdapter>,
        cache: Arc<dyn CacheAdapter>,
    ) -> Self {
        Self {
            config,
            db,
            cache,
            identifier_field: None,
        }
    }

    /// Extract identifiers from `field` instead of the `id`/`identifier`/
    /// `license` fallback chain.
    pub fn with_identifier_field(mut self, field: &'static str) -> Self {
        self.identifier_field = Some(field);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn db(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.db
    }

    pub fn cache(&self) -> &Arc<dyn CacheAdapter> {
        &self.cache
    }

    pub fn cache_key(&self, identifier: &str, suffix: Option<&str>) -> CacheKey {
        CacheKey::new(self.config.cache_prefix(), identifier, suffix)
    }

    fn ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or_else(|| self.config.default_ttl())
    }

    async fn cached_row(&self, key: &CacheKey) -> Option<Row> {
        match self.cache.get(key.as_str()).await {
            Some(JsonValue::Object(row)) => {
                tracing::debug!(storage = %self.name(), key = %key, "cache hit");
                Some(row)
            }
            Some(_) => {
                tracing::debug!(storage = %self.name(), key = %key, "cached value is not a row");
                None
            }
            None => {
                tracing::debug!(storage = %self.name(), key = %key, "cache miss");
                None
            }
        }
    }

    /// Store `value` at `key`. When caching is off, or the write fails, the
    /// key is deleted so no stale value can outlive the write.
    async fn write_through(&self, key: &CacheKey, value: JsonValue, ttl: Option<Duration>) {
        if self.config.cache_enabled()
            && self.cache.set(key.as_str(), &value, Some(self.ttl(ttl))).await
        {
            return;
        }
        self.cache.delete(key.as_str()).await;
    }

    /// Fetch one row, cache first.
    ///
    /// Returns `Ok(None)` when the database has no matching row. A database
    /// error leaves the cache untouched.
    pub async fn get(
        &self,
        identifier: &str,
        query: &str,
        params: &Params,
        options: ReadOptions,
    ) -> HearthResult<Option<Row>> {
        let key = self.cache_key(identifier, options.suffix);

        if self.config.cache_enabled() && !options.force_db {
            if let Some(row) = self.cached_row(&key).await {
                return Ok(Some(row));
            }
        }

        let row = self.db.single(query, params).await?;
        if let Some(row) = &row {
            if self.config.cache_enabled() {
                self.write_through(&key, JsonValue::Object(row.clone()), options.ttl)
                    .await;
            }
        }
        Ok(row)
    }

    /// Fetch several rows by identifier with one batched query for the misses.
    ///
    /// `build_query` receives the identifiers that missed the cache and
    /// returns the query and its parameters. The result follows the order of
    /// `identifiers`; identifiers with no row anywhere are left out.
    pub async fn get_many<F>(
        &self,
        identifiers: &[String],
        build_query: F,
        options: ReadOptions,
    ) -> HearthResult<Vec<Row>>
    where
        F: FnOnce(&[String]) -> (String, Params),
    {
        let use_cache = self.config.cache_enabled() && !options.force_db;
        let mut found: HashMap<String, Row> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut missing: Vec<String> = Vec::new();

        for identifier in identifiers {
            if !seen.insert(identifier.as_str()) {
                continue;
            }
            if use_cache {
                let key = self.cache_key(identifier, options.suffix);
                if let Some(row) = self.cached_row(&key).await {
                    found.insert(identifier.clone(), row);
                    continue;
                }
            }
            missing.push(identifier.clone());
        }

        if !missing.is_empty() {
            let (query, params) = build_query(&missing);
            for row in self.db.query(&query, &params).await? {
                let Some(identifier) = self.extract_identifier(&row) else {
                    tracing::debug!(storage = %self.name(), "row without identifier in batch result");
                    continue;
                };
                if self.config.cache_enabled() {
                    let key = self.cache_key(&identifier, options.suffix);
                    self.write_through(&key, JsonValue::Object(row.clone()), options.ttl)
                        .await;
                }
                found.insert(identifier, row);
            }
        }

        Ok(identifiers
            .iter()
            .filter_map(|identifier| found.get(identifier).cloned())
            .collect())
    }

    /// Insert a row and return its generated id.
    pub async fn create(
        &self,
        query: &str,
        params: &Params,
        options: CreateOptions,
    ) -> HearthResult<i64> {
        let id = self
            .db
            .insert(query, params)
            .await?
            .ok_or_else(|| StorageError::NoGeneratedId {
                storage: self.name().to_string(),
            })?;

        if let Some(mut data) = options.cache_data {
            if self.config.cache_enabled() {
                data.entry("id").or_insert_with(|| JsonValue::from(id));
                let identifier = options.identifier.unwrap_or_else(|| id.to_string());
                let key = self.cache_key(&identifier, options.suffix);
                self.write_through(&key, JsonValue::Object(data), options.ttl)
                    .await;
            }
        }

        Ok(id)
    }

    /// Run an update and return the affected row count.
    ///
    /// With `new_data` (and without `invalidate_only`) the cache entry is
    /// overwritten with it; otherwise the entry is deleted.
    ///
    /// An update that touched no rows always invalidates, even when
    /// `new_data` is supplied: write-through only happens for rows the
    /// database actually holds, so `new_data` is never cached for a missing
    /// row.
    pub async fn update(
        &self,
        identifier: &str,
        query: &str,
        params: &Params,
        options: UpdateOptions,
    ) -> HearthResult<u64> {
        let affected = self.db.update(query, params).await?;
        let key = self.cache_key(identifier, options.suffix);

        match options.new_data {
            Some(data) if !options.invalidate_only && affected > 0 => {
                self.write_through(&key, JsonValue::Object(data), options.ttl)
                    .await;
            }
            _ => {
                self.cache.delete(key.as_str()).await;
            }
        }

        Ok(affected)
    }

    /// Run a delete and drop the cache entry whether or not a row existed.
    pub async fn delete(
        &self,
        identifier: &str,
        query: &str,
        params: &Params,
        options: DeleteOptions,
    ) -> HearthResult<u64> {
        let affected = self.db.execute(query, params).await?;
        self.cache
            .delete(self.cache_key(identifier, options.suffix).as_str())
            .await;
        Ok(affected)
    }

    pub async fn invalidate_cache(&self, identifier: &str, suffix: Option<&str>) -> bool {
        self.cache
            .delete(self.cache_key(identifier, suffix).as_str())
            .await
    }

    pub async fn invalidate_cache_many(&self, identifiers: &[String], suffix: Option<&str>) -> u64 {
        let keys: Vec<String> = identifiers
            .iter()
            .map(|identifier| self.cache_key(identifier, suffix).into_string())
            .collect();
        self.cache.delete_many(&keys).await
    }

    /// Drop every entry under this storage's prefix.
    pub async fn invalidate_all(&self) -> u64 {
        let pattern = CacheKey::prefix_pattern(self.config.cache_prefix());
        let deleted = self.cache.delete_pattern(&pattern).await;
        tracing::debug!(storage = %self.name(), deleted, "invalidated all cache entries");
        deleted
    }

    /// Write a value straight to the cache, bypassing the database.
    pub async fn set_cache(&self, identifier: &str, value: &JsonValue, options: CacheOptions) -> bool {
        if !self.config.cache_enabled() {
            return false;
        }
        let key = self.cache_key(identifier, options.suffix);
        self.cache
            .set(key.as_str(), value, Some(self.ttl(options.ttl)))
            .await
    }

    /// Read a value straight from the cache, never touching the database.
    pub async fn get_cache_only(&self, identifier: &str, suffix: Option<&str>) -> Option<JsonValue> {
        if !self.config.cache_enabled() {
            return None;
        }
        self.cache
            .get(self.cache_key(identifier, suffix).as_str())
            .await
    }

    fn query_caches(&self, options: &QueryOptions) -> bool {
        self.config.cache_enabled() && !options.skip_cache
    }

    /// Arbitrary single-row query cached under `prefix:cache_key`.
    pub async fn custom_query_one(
        &self,
        cache_key: &str,
        query: &str,
        params: &Params,
        options: QueryOptions,
    ) -> HearthResult<Option<Row>> {
        let key = self.cache_key(cache_key, None);
        if self.query_caches(&options) {
            if let Some(row) = self.cached_row(&key).await {
                return Ok(Some(row));
            }
        }

        let row = self.db.single(query, params).await?;
        if let Some(row) = &row {
            if self.query_caches(&options) {
                self.write_through(&key, JsonValue::Object(row.clone()), options.ttl)
                    .await;
            }
        }
        Ok(row)
    }

    /// Arbitrary multi-row query cached under `prefix:cache_key`.
    ///
    /// Empty results are cached too, so writes that can add rows to the
    /// result must invalidate the key.
    pub async fn custom_query_many(
        &self,
        cache_key: &str,
        query: &str,
        params: &Params,
        options: QueryOptions,
    ) -> HearthResult<Vec<Row>> {
        let key = self.cache_key(cache_key, None);
        if self.query_caches(&options) {
            if let Some(JsonValue::Array(items)) = self.cache.get(key.as_str()).await {
                tracing::debug!(storage = %self.name(), key = %key, "cache hit");
                return Ok(items
                    .into_iter()
                    .filter_map(|item| match item {
                        JsonValue::Object(row) => Some(row),
                        _ => None,
                    })
                    .collect());
            }
            tracing::debug!(storage = %self.name(), key = %key, "cache miss");
        }

        let rows = self.db.query(query, params).await?;
        if self.query_caches(&options) {
            let value = JsonValue::Array(rows.iter().cloned().map(JsonValue::Object).collect());
            self.write_through(&key, value, options.ttl).await;
        }
        Ok(rows)
    }

    /// Identifier of a row for cache keying.
    pub fn extract_identifier(&self, row: &Row) -> Option<String> {
        match self.identifier_field {
            Some(field) => row_str(row, field),
            None => ["id", "identifier", "license"]
                .iter()
                .find_map(|field| row_str(row, field)),
        }
    }

    /// Wait for both adapters. Returns `false` if either misses the deadline.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        let both = async {
            let (db, cache) = tokio::join!(
                self.db.await_ready(timeout),
                self.cache.await_ready(timeout)
            );
            db && cache
        };
        tokio::time::timeout(timeout, both).await.unwrap_or(false)
    }

    pub fn health(&self) -> HealthCheck {
        HealthCheck::from_readiness(self.name(), self.db.is_ready(), self.cache.is_ready())
    }
}
