//! Hearth Core - Shared Types
//!
//! Vocabulary shared by every hearth crate: the row and parameter shapes that
//! cross the database adapter boundary, storage configuration, cache key
//! derivation, the error taxonomy and the bounded readiness retry policy.
//! This crate performs no I/O of its own.

pub mod cache_key;
pub mod config;
pub mod error;
pub mod health;
pub mod retry;

pub use cache_key::CacheKey;
pub use config::{StorageConfig, DEFAULT_TTL};
pub use error::{
    ConfigError, HearthError, HearthResult, MigrationError, StorageError, ValidationError,
};
pub use health::{HealthCheck, HealthStatus};
pub use retry::RetryPolicy;

// Re-exported so the `params!` macro resolves in downstream crates.
pub use serde_json;

use serde_json::Value as JsonValue;

// ============================================================================
// ROW / PARAMETER SHAPES
// ============================================================================

/// A single relational row as an attribute mapping (column name to value).
///
/// Rows carry no identity: every read may return a fresh copy from cache or
/// database.
pub type Row = serde_json::Map<String, JsonValue>;

/// Named query parameters, bound to `:name` placeholders by the database
/// adapter.
pub type Params = serde_json::Map<String, JsonValue>;

/// Build a [`Params`] map from `name => value` pairs.
///
/// ```
/// use hearth_core::params;
///
/// let params = params! { "license" => "license:abc", "amount" => 25 };
/// assert_eq!(params["amount"], 25);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Params::new();
        $(
            map.insert(
                ($key).to_string(),
                $crate::serde_json::to_value(&$value).unwrap_or($crate::serde_json::Value::Null),
            );
        )+
        map
    }};
}

/// Read a string column, accepting numbers as their decimal form.
pub fn row_str(row: &Row, field: &str) -> Option<String> {
    match row.get(field)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read an integer column, accepting numeric strings.
pub fn row_i64(row: &Row, field: &str) -> Option<i64> {
    match row.get(field)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}
