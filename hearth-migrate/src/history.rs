//! The `schema_migrations` history table.
//!
//! The table's name and columns are a durable contract: external tooling
//! reads it for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    id SERIAL PRIMARY KEY,
    version VARCHAR(64) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    checksum VARCHAR(64) NOT NULL,
    executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    execution_time_ms BIGINT NOT NULL DEFAULT 0,
    success BOOLEAN NOT NULL,
    error_message TEXT
)";

/// Successful record for one version, if any.
pub const SELECT_APPLIED: &str =
    "SELECT * FROM schema_migrations WHERE version = :version AND success = TRUE";

pub const SELECT_ALL: &str = "SELECT * FROM schema_migrations ORDER BY id";

/// Record an attempt. A failed attempt is replaced by its retry; a
/// successful row is never rewritten.
pub const RECORD: &str = "INSERT INTO schema_migrations \
     (version, name, checksum, executed_at, execution_time_ms, success, error_message) \
     VALUES (:version, :name, :checksum, :executed_at, :execution_time_ms, :success, :error_message) \
     ON CONFLICT (version) DO UPDATE SET \
     name = EXCLUDED.name, checksum = EXCLUDED.checksum, executed_at = EXCLUDED.executed_at, \
     execution_time_ms = EXCLUDED.execution_time_ms, success = EXCLUDED.success, \
     error_message = EXCLUDED.error_message \
     WHERE schema_migrations.success = FALSE";

/// One row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    pub checksum: String,
    pub executed_at: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}
