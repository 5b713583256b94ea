//! Error Types for the Storage Service Boundary
//!
//! Callers outside the persistence core only ever see a [`ServiceError`]:
//! an error code plus a message that is safe to show to a player. Database
//! and cache failures are logged in full and replaced with a generic
//! retry-later message.

use std::fmt;

use hearth_core::{HearthError, StorageError};
use serde::{Deserialize, Serialize};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input was rejected before any I/O happened
    ValidationFailed,

    /// No storage is registered under the requested name
    StorageNotFound,

    /// The requested record does not exist
    EntityNotFound,

    /// Database or cache failure; safe to retry later
    StorageUnavailable,

    /// Startup failure outside the storage layer
    InternalError,
}

impl ErrorCode {
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::StorageNotFound => "Storage is not registered",
            ErrorCode::EntityNotFound => "Record not found",
            ErrorCode::StorageUnavailable => {
                "Storage is temporarily unavailable, please retry later"
            }
            ErrorCode::InternalError => "Internal server error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::StorageNotFound => "STORAGE_NOT_FOUND",
            ErrorCode::EntityNotFound => "ENTITY_NOT_FOUND",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SERVICE ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn storage_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::StorageNotFound,
            format!("No storage registered as '{}'", name),
        )
    }

    pub fn unavailable() -> Self {
        Self::from_code(ErrorCode::StorageUnavailable)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Validation and not-found errors carry no database text and pass through.
/// Everything else is logged and hidden.
impl From<HearthError> for ServiceError {
    fn from(err: HearthError) -> Self {
        match err {
            HearthError::Validation(e) => Self::new(ErrorCode::ValidationFailed, e.to_string()),
            HearthError::Storage(e @ StorageError::NotFound { .. }) => {
                Self::new(ErrorCode::EntityNotFound, e.to_string())
            }
            other => {
                tracing::error!(error = %other, "storage operation failed");
                Self::unavailable()
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
