//! Domain storages.
//!
//! Each storage fixes a [`StorageConfig`](hearth_core::StorageConfig) and maps
//! application intents to queries on top of [`BaseStorage`](crate::BaseStorage).
//! Cached views of the same entity are not linked automatically: every write
//! method lists the views it invalidates in its own documentation.

pub mod character;
pub mod log;
pub mod penalty;
pub mod user;

pub use character::{Character, CharacterFull, CharacterStorage, NewCharacter, Position};
pub use log::{LogEntry, LogStorage, NewLogEntry};
pub use penalty::{NewPenalty, Penalty, PenaltyKind, PenaltyStorage};
pub use user::{NewUser, User, UserStorage};

use chrono::{DateTime, SubsecRound, Utc};
use hearth_core::{HearthError, HearthResult, Row, StorageError, ValidationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Decode a row into a typed record.
pub fn decode<T: DeserializeOwned>(row: Row) -> HearthResult<T> {
    Ok(serde_json::from_value(JsonValue::Object(row))?)
}

pub fn decode_opt<T: DeserializeOwned>(row: Option<Row>) -> HearthResult<Option<T>> {
    row.map(decode).transpose()
}

pub fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> HearthResult<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

/// Encode a record as a row, for seeding or writing through the cache.
pub fn to_row<T: Serialize>(value: &T) -> HearthResult<Row> {
    match serde_json::to_value(value)? {
        JsonValue::Object(row) => Ok(row),
        other => Err(StorageError::Serialization {
            reason: format!("expected an object, got {}", other),
        }
        .into()),
    }
}

/// Reject blank required text fields.
pub fn require(field: &str, value: &str) -> HearthResult<()> {
    if value.trim().is_empty() {
        return Err(HearthError::required(field));
    }
    Ok(())
}

pub fn require_positive(field: &str, value: i64) -> HearthResult<()> {
    if value <= 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be positive, got {}", value),
        }
        .into());
    }
    Ok(())
}

/// Current time at the precision PostgreSQL stores, so seeded cache rows
/// match what a later read returns.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

crate::impl_managed_storage!(UserStorage, CharacterStorage, PenaltyStorage, LogStorage);
