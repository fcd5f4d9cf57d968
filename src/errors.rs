//! Structured error types with stable codes for API clients

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation Errors (400)
    InvalidInput { field: String, reason: String },
    InvalidTopic(String),

    // Not Found Errors (404)
    MemoryNotFound(String),
    TopicNotFound(String),

    // Internal Errors (500)
    StorageError(String),
    EmbeddingError(String),
    SerializationError(String),

    // Service Errors (503)
    SearchError(String),
    ServiceUnavailable(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidTopic(_) => "INVALID_TOPIC",
            Self::MemoryNotFound(_) => "MEMORY_NOT_FOUND",
            Self::TopicNotFound(_) => "TOPIC_NOT_FOUND",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::EmbeddingError(_) => "EMBEDDING_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::SearchError(_) => "SEARCH_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::InvalidTopic(_) => StatusCode::BAD_REQUEST,

            Self::MemoryNotFound(_) | Self::TopicNotFound(_) => StatusCode::NOT_FOUND,

            Self::SearchError(_) | Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            Self::StorageError(_)
            | Self::EmbeddingError(_)
            | Self::SerializationError(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::InvalidTopic(msg) => format!("Invalid topic: {msg}"),
            Self::MemoryNotFound(id) => format!("Memory not found: {id}"),
            Self::TopicNotFound(topic) => format!("Topic not scheduled: {topic}"),
            Self::StorageError(msg) => format!("Storage error: {msg}"),
            Self::EmbeddingError(msg) => format!("Embedding error: {msg}"),
            Self::SerializationError(msg) => format!("Serialization error: {msg}"),
            Self::SearchError(msg) => format!("Search error: {msg}"),
            Self::ServiceUnavailable(msg) => format!("Service unavailable: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details: None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_response();

        (status, Json(body)).into_response()
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::InvalidTopic("too short".to_string()).code(),
            "INVALID_TOPIC"
        );
        assert_eq!(AppError::MemoryNotFound("123".to_string()).code(), "MEMORY_NOT_FOUND");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::InvalidTopic("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MemoryNotFound("123".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::SearchError("timeout".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_response_serialization() {
        let err = AppError::TopicNotFound("rust".to_string());
        let response = err.to_response();

        assert_eq!(response.code, "TOPIC_NOT_FOUND");
        assert!(response.message.contains("rust"));
    }
}
