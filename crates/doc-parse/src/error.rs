//! Error types for the parsing pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The file store has no bytes for this id
    #[error("File with ID {0} not found")]
    FileNotFound(Uuid),

    /// A job or parsed-file record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No parser is registered for the sniffed MIME type
    #[error("No parser found for file type {0}")]
    UnsupportedFormat(String),

    /// Container, XML or page structure could not be parsed
    #[error("Malformed {format} input: {message}")]
    MalformedInput { format: String, message: String },

    /// Persistence layer failure (SQLite, file store)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Job queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Execution bridge failure (startup, timeout, terminated context)
    #[error("Execution bridge error: {0}")]
    Bridge(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a malformed input error
    pub fn malformed(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    /// Create a bridge error
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for queue/store/bridge outages, as opposed to problems with the input itself
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Queue(_) | Error::Bridge(_) | Error::Io(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::FileNotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Error::UnsupportedFormat(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_type",
                self.to_string(),
            ),
            Error::MalformedInput { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "parse_error",
                self.to_string(),
            ),
            Error::Storage(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg.clone())
            }
            Error::Queue(msg) => (StatusCode::SERVICE_UNAVAILABLE, "queue_error", msg.clone()),
            Error::Bridge(msg) => (StatusCode::SERVICE_UNAVAILABLE, "bridge_error", msg.clone()),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
