//! Error types for hearth operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error: {reason}")]
    Database { reason: String },

    #[error("Insert into {storage} produced no generated id")]
    NoGeneratedId { storage: String },

    #[error("Cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    #[error("{component} is not ready")]
    NotReady { component: String },

    #[error("Row could not be decoded: {reason}")]
    Serialization { reason: String },

    #[error("No {storage} record for identifier {identifier}")]
    NotFound { storage: String, identifier: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors, raised before any I/O is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Database renew is disabled outside development environments")]
    RenewDisabled,
}

/// Schema migration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Failed to read migrations from {path}: {reason}")]
    Discovery { path: String, reason: String },

    #[error("Migration history table unavailable: {reason}")]
    HistoryTable { reason: String },

    #[error("Checksum mismatch for migration {version}: recorded {expected}, file has {actual}")]
    ChecksumMismatch {
        version: String,
        expected: String,
        actual: String,
    },

    #[error("Migration {version} failed: {reason}")]
    Execution { version: String, reason: String },

    #[error("Tables survived database renew: {survivors:?}")]
    RenewVerification { survivors: Vec<String> },

    #[error("Database did not become ready before the migration deadline")]
    NotReady,
}

/// Master error type for all hearth errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HearthError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

impl HearthError {
    /// Shorthand for a database failure carrying the adapter's message.
    pub fn database(reason: impl Into<String>) -> Self {
        StorageError::Database {
            reason: reason.into(),
        }
        .into()
    }

    /// Shorthand for a missing required field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::RequiredFieldMissing {
            field: field.into(),
        }
        .into()
    }

    /// Whether this error was raised before any I/O happened.
    pub fn is_validation(&self) -> bool {
        matches!(self, HearthError::Validation(_))
    }
}

impl From<serde_json::Error> for HearthError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            reason: err.to_string(),
        }
        .into()
    }
}

/// Result type alias for hearth operations.
pub type HearthResult<T> = Result<T, HearthError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_no_generated_id() {
        let err = StorageError::NoGeneratedId {
            storage: "characters".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("characters"));
        assert!(msg.contains("no generated id"));
    }

    #[test]
    fn test_migration_error_display_checksum_mismatch() {
        let err = MigrationError::ChecksumMismatch {
            version: "003".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("003"));
        assert!(msg.contains("recorded aa"));
        assert!(msg.contains("file has bb"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "HEARTH_DB_PORT".to_string(),
            value: "abc".to_string(),
            reason: "must be a port number".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("HEARTH_DB_PORT"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_hearth_error_from_variants() {
        let storage = HearthError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, HearthError::Storage(_)));

        let validation = HearthError::required("license");
        assert!(validation.is_validation());

        let config = HearthError::from(ConfigError::RenewDisabled);
        assert!(matches!(config, HearthError::Config(_)));

        let migration = HearthError::from(MigrationError::NotReady);
        assert!(matches!(migration, HearthError::Migration(_)));
        assert!(!migration.is_validation());
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let err = serde_json::from_str::<i64>("not json").unwrap_err();
        let mapped = HearthError::from(err);
        assert!(matches!(
            mapped,
            HearthError::Storage(StorageError::Serialization { .. })
        ));
    }
}
