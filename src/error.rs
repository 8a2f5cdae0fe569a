//! Structured error types for coordination operations.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Caller mistakes
    ValidationError,
    NotHolder,
    AlreadyResolved,
    NotFound,

    // Storage
    TransientStorageError,
    StorageError,
}

/// Error returned by every coordination operation.
///
/// A denied claim is not an error; see [`crate::types::ClaimOutcome`].
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("agent {agent_id} does not hold task {task_id} in feature {feature_id}")]
    NotHolder {
        feature_id: String,
        task_id: String,
        agent_id: String,
        /// Agent holding the active claim, if any.
        holder: Option<String>,
    },

    #[error("conflict {0} is already resolved")]
    AlreadyResolved(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Busy or locked store. Safe to retry.
    #[error("storage temporarily unavailable: {0}")]
    TransientStorage(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CoordError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::validation(field, format!("{} is required", field))
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn not_holder(feature_id: &str, task_id: &str, agent_id: &str, holder: Option<String>) -> Self {
        Self::NotHolder {
            feature_id: feature_id.to_string(),
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            holder,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NotHolder { .. } => ErrorCode::NotHolder,
            Self::AlreadyResolved(_) => ErrorCode::AlreadyResolved,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::TransientStorage(_) => ErrorCode::TransientStorageError,
            Self::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// Whether the caller may retry the same call unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }

    /// JSON body for CLI and adapter responses.
    pub fn to_response(&self) -> ErrorResponse {
        let field = match self {
            Self::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            field,
        }
    }
}

/// Serializable form of a [`CoordError`].
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<rusqlite::Error> for CoordError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode as SqliteCode;

        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked) =>
            {
                Self::TransientStorage(err.to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoordError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("corrupt JSON column: {}", err))
    }
}

impl From<refinery::Error> for CoordError {
    fn from(err: refinery::Error) -> Self {
        Self::Storage(format!("migration failed: {}", err))
    }
}

/// Result type for coordination operations.
pub type Result<T> = std::result::Result<T, CoordError>;
