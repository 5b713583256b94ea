//! Hearth Test Utilities
//!
//! Shared test infrastructure for the hearth workspace:
//! - Proptest generators for identifiers, cache key parts and TTLs
//! - Row fixtures shaped like the shipped schema
//! - A ready-made scripted database plus in-memory cache pair
//! - Assertions for cache contents and error categories

// Re-export the test doubles from their source crate
pub use hearth_storage::{MemoryCache, MockCall, MockDatabase, MockMethod};

// Re-export core types for convenience
pub use hearth_core::{
    params, HearthError, HearthResult, MigrationError, Params, Row, StorageError,
    ValidationError,
};

use std::sync::Arc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for hearth inputs.

    use proptest::prelude::*;
    use std::time::Duration;

    /// A platform license such as `license:3f9a...`.
    pub fn arb_license() -> impl Strategy<Value = String> {
        "[0-9a-f]{16,40}".prop_map(|hex| format!("license:{}", hex))
    }

    pub fn arb_username() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9_]{2,15}"
    }

    /// Identifier safe to embed in a cache key (no `:`, `*` or `?`).
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        prop_oneof![
            (1i64..1_000_000).prop_map(|id| id.to_string()),
            "[a-z0-9_-]{1,24}",
        ]
    }

    pub fn arb_suffix() -> impl Strategy<Value = Option<&'static str>> {
        prop_oneof![
            Just(None),
            Just(Some("id")),
            Just(Some("username")),
            Just(Some("full")),
            Just(Some("user")),
            Just(Some("active")),
        ]
    }

    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..86_400).prop_map(Duration::from_secs)
    }

    pub fn arb_money() -> impl Strategy<Value = i64> {
        0i64..10_000_000
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Rows as the database would return them.

    use super::*;
    use serde_json::json;

    pub const FIXED_TIMESTAMP: &str = "2024-03-01T12:00:00Z";

    /// A scripted database and an in-memory cache, both ready.
    pub fn storage_stack() -> (Arc<MockDatabase>, Arc<MemoryCache>) {
        (Arc::new(MockDatabase::new()), Arc::new(MemoryCache::new()))
    }

    pub fn user_row(id: i64, license: &str, username: &str) -> Row {
        params! {
            "id" => id,
            "license" => license,
            "username" => username,
            "discord" => serde_json::Value::Null,
            "playtime" => 0,
            "last_seen" => serde_json::Value::Null,
            "created_at" => FIXED_TIMESTAMP,
        }
    }

    pub fn character_row(id: i64, user_id: i64, first_name: &str, last_name: &str) -> Row {
        params! {
            "id" => id,
            "user_id" => user_id,
            "first_name" => first_name,
            "last_name" => last_name,
            "gender" => serde_json::Value::Null,
            "date_of_birth" => serde_json::Value::Null,
            "job" => "unemployed",
            "job_grade" => 0,
            "cash" => 500,
            "bank" => 5000,
            "position" => json!({"x": 0.0, "y": 0.0, "z": 0.0, "heading": 0.0}),
            "created_at" => FIXED_TIMESTAMP,
        }
    }

    /// A permanent, unrevoked ban.
    pub fn ban_row(id: i64, user_id: i64, reason: &str) -> Row {
        params! {
            "id" => id,
            "user_id" => user_id,
            "kind" => "ban",
            "reason" => reason,
            "issued_by" => "admin:console",
            "expires_at" => serde_json::Value::Null,
            "revoked" => false,
            "revoked_by" => serde_json::Value::Null,
            "revoked_at" => serde_json::Value::Null,
            "created_at" => FIXED_TIMESTAMP,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache state and error categories.

    use super::*;

    /// Assert that `key` holds a live cache entry and return it.
    #[track_caller]
    pub fn assert_cached(cache: &MemoryCache, key: &str) -> serde_json::Value {
        match cache.peek(key) {
            Some(value) => value,
            None => panic!("Expected cache entry at {}, cached keys: {:?}", key, cache.keys()),
        }
    }

    #[track_caller]
    pub fn assert_not_cached(cache: &MemoryCache, key: &str) {
        if let Some(value) = cache.peek(key) {
            panic!("Expected no cache entry at {}, found {}", key, value);
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &HearthResult<T>) {
        match result {
            Err(HearthError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_database_error<T: std::fmt::Debug>(result: &HearthResult<T>) {
        match result {
            Err(HearthError::Storage(StorageError::Database { .. })) => {}
            other => panic!("Expected Database error, got: {:?}", other),
        }
    }

    /// Assert that no database call was made since the last reset.
    #[track_caller]
    pub fn assert_no_db_calls(db: &MockDatabase) {
        let calls = db.calls();
        assert!(calls.is_empty(), "Expected no database calls, got: {:?}", calls);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_storage::{CacheAdapter, Character, Penalty, PenaltyKind, User};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fixtures_decode_as_domain_records() {
        let user: User =
            serde_json::from_value(fixtures::user_row(1, "license:abc", "alice").into()).unwrap();
        assert_eq!(user.username, "alice");

        let character: Character =
            serde_json::from_value(fixtures::character_row(7, 1, "Ada", "Stone").into()).unwrap();
        assert_eq!(character.job, "unemployed");
        assert_eq!(character.bank, 5000);

        let penalty: Penalty =
            serde_json::from_value(fixtures::ban_row(3, 1, "cheating").into()).unwrap();
        assert_eq!(penalty.kind, PenaltyKind::Ban);
        assert!(penalty.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_cache_assertions() {
        let (_, cache) = fixtures::storage_stack();
        cache.set("user:abc", &json!({"id": 1}), None).await;
        assert_eq!(assertions::assert_cached(&cache, "user:abc"), json!({"id": 1}));
        assertions::assert_not_cached(&cache, "user:missing");
    }

    #[test]
    fn test_error_assertions() {
        assertions::assert_validation_error::<()>(&Err(HearthError::required("license")));
        assertions::assert_database_error::<()>(&Err(HearthError::database("boom")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_identifiers_are_key_safe(id in generators::arb_identifier()) {
            prop_assert!(!id.is_empty());
            prop_assert!(!id.contains([':', '*', '?']));
        }

        #[test]
        fn prop_licenses_are_prefixed(license in generators::arb_license()) {
            prop_assert!(license.starts_with("license:"));
        }
    }
}
