//! Error types for tablesync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias for tablesync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    UnknownEntityType,
    RecordNotFound,

    // Validation (exit 4)
    InvalidArgument,
    ValidationFailed,

    // Remote (exit 6)
    RemoteError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::UnknownEntityType => "UNKNOWN_ENTITY_TYPE",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::UnknownEntityType | Self::RecordNotFound => 3,
            Self::InvalidArgument | Self::ValidationFailed => 4,
            Self::RemoteError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying with corrected input can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::ValidationFailed | Self::UnknownEntityType | Self::RemoteError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tablesync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `tsync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Unknown entity type: {label}")]
    UnknownEntityType { label: String, similar: Vec<String> },

    #[error("Record not found: {entity_type} #{id}")]
    RecordNotFound { entity_type: String, id: i64 },

    #[error("Validation failed: {0}")]
    Validation(crate::validate::FieldErrors),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::UnknownEntityType { .. } => ErrorCode::UnknownEntityType,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `tsync init` to create the database and a sample config".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::UnknownEntityType { similar, .. } if !similar.is_empty() => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }
            Self::UnknownEntityType { .. } => Some(
                "Use `tsync status` to list configured types (format: app.Model)".to_string(),
            ),

            Self::RecordNotFound { entity_type, .. } => Some(format!(
                "Use `tsync record list {entity_type}` to see stored records."
            )),

            Self::Remote(err) => {
                let details = err.details();
                match details.status_code {
                    401 | 403 => Some("Check the api_key setting or TSYNC_API_KEY".to_string()),
                    0 => None,
                    _ => Some(details.message),
                }
            }

            Self::Config(_) => {
                Some("Check tablesync.json or pass --config <PATH>".to_string())
            }

            Self::Database(_) | Self::Io(_) | Self::Json(_) | Self::Validation(_)
            | Self::InvalidArgument(_) | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }
        if let Self::Validation(errors) = self {
            obj["error"]["fields"] = serde_json::to_value(errors).unwrap_or_default();
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_exit_code_and_hint() {
        let err = Error::UnknownEntityType {
            label: "blog.Pots".into(),
            similar: vec!["blog.Post".into()],
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.hint().as_deref(), Some("Did you mean: blog.Post?"));
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "UNKNOWN_ENTITY_TYPE");
    }

    #[test]
    fn test_remote_error_hint_uses_parsed_message() {
        let err = Error::Remote(RemoteError::Http(
            "422 Client Error: Unprocessable for url: x [Error: {'type': 'INVALID', 'message': 'Bad cell'}]"
                .into(),
        ));
        assert_eq!(err.exit_code(), 6);
        assert_eq!(err.hint().as_deref(), Some("Bad cell"));
    }
}
