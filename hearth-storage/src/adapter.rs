//! Adapter traits for the two external services every storage depends on.
//!
//! Storages never talk to a driver directly. They go through these narrow
//! contracts so the database and cache can be swapped (PostgreSQL, LMDB,
//! in-memory, scripted mocks) without touching cache-aside logic.

use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{HearthResult, Params, Row};
use serde_json::Value as JsonValue;

/// Relational database contract.
///
/// Queries use named placeholders (`:name`) bound from [`Params`].
/// Every failure is returned as an error value; nothing here panics for
/// expected failures such as constraint violations or bad SQL.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Fetch at most one row. `Ok(None)` means the row does not exist.
    async fn single(&self, query: &str, params: &Params) -> HearthResult<Option<Row>>;

    /// Fetch every matching row.
    async fn query(&self, query: &str, params: &Params) -> HearthResult<Vec<Row>>;

    /// Run an insert and return the generated id, if the statement produced one.
    async fn insert(&self, query: &str, params: &Params) -> HearthResult<Option<i64>>;

    /// Run an update and return the affected row count.
    async fn update(&self, query: &str, params: &Params) -> HearthResult<u64>;

    /// Run any other statement and return the affected row count.
    async fn execute(&self, query: &str, params: &Params) -> HearthResult<u64>;

    /// Run raw SQL (possibly several statements) without parameters.
    async fn raw_query(&self, sql: &str) -> HearthResult<()>;

    /// Whether the adapter has completed its connection handshake.
    fn is_ready(&self) -> bool;

    /// Wait until ready or until `timeout` elapses. Returns `false` on timeout.
    async fn await_ready(&self, timeout: Duration) -> bool;
}

/// Key/value cache contract.
///
/// Implementations fail open: an unreachable or broken cache behaves like an
/// empty one (misses, `false`, `0`) and logs the failure instead of
/// returning it.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Get a live (non-expired) value.
    async fn get(&self, key: &str) -> Option<JsonValue>;

    /// Store a value, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &JsonValue, ttl: Option<Duration>) -> bool;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> bool;

    /// Remove several keys. Returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> u64;

    /// Remove every key matching a glob pattern (`*` and `?`).
    async fn delete_pattern(&self, pattern: &str) -> u64;

    fn is_ready(&self) -> bool;

    /// Wait until ready or until `timeout` elapses. Returns `false` on timeout.
    async fn await_ready(&self, timeout: Duration) -> bool;
}
