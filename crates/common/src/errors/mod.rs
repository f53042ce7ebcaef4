//! Error types for MedVault services
//!
//! Provides a single error taxonomy shared by the lifecycles and the HTTP layer:
//! - Distinct error types for validation, authorization, lookup and external failures
//! - HTTP status code mapping
//! - Structured `{ success, message, error }` envelopes
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFileType,
    PayloadTooLarge,
    InvalidReference,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidToken,
    ExpiredToken,
    AccountInactive,

    // Authorization errors (3xxx)
    Forbidden,

    // Resource errors (4xxx)
    NotFound,
    UserNotFound,
    PatientNotFound,
    UploadNotFound,
    AnalysisNotFound,

    // Conflict errors (5xxx)
    Conflict,
    Duplicate,
    InvalidTransition,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    StorageError,
    StorageReadError,
    InferenceError,
    InferenceTimeout,
    ReportRenderError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFileType => 1003,
            ErrorCode::PayloadTooLarge => 1004,
            ErrorCode::InvalidReference => 1005,

            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidToken => 2002,
            ErrorCode::ExpiredToken => 2003,
            ErrorCode::AccountInactive => 2004,

            ErrorCode::Forbidden => 3001,

            ErrorCode::NotFound => 4001,
            ErrorCode::UserNotFound => 4002,
            ErrorCode::PatientNotFound => 4003,
            ErrorCode::UploadNotFound => 4004,
            ErrorCode::AnalysisNotFound => 4005,

            ErrorCode::Conflict => 5001,
            ErrorCode::Duplicate => 5002,
            ErrorCode::InvalidTransition => 5003,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::StorageError => 8002,
            ErrorCode::StorageReadError => 8003,
            ErrorCode::InferenceError => 8004,
            ErrorCode::InferenceTimeout => 8005,
            ErrorCode::ReportRenderError => 8006,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("File type not allowed: {content_type}")]
    InvalidFileType { content_type: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Invalid reference: {message}")]
    InvalidReference { message: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Account is deactivated")]
    AccountInactive,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Patient not found: {id}")]
    PatientNotFound { id: String },

    #[error("Upload not found: {id}")]
    UploadNotFound { id: String },

    #[error("Analysis not found: {id}")]
    AnalysisNotFound { id: String },

    // Conflict errors
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    // Rate limiting
    #[error("Rate limit exceeded")]
    RateLimited,

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Object storage error: {message}")]
    Storage { message: String },

    #[error("Failed to read stored object {key}: {message}")]
    StorageRead { key: String, message: String },

    #[error("Inference provider error: {message}")]
    Inference { message: String, retryable: bool },

    #[error("Inference timed out after {timeout_ms}ms")]
    InferenceTimeout { timeout_ms: u64 },

    #[error("Report rendering failed: {message}")]
    ReportRender { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for a field-level validation error
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFileType { .. } => ErrorCode::InvalidFileType,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::InvalidReference { .. } => ErrorCode::InvalidReference,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::AccountInactive => ErrorCode::AccountInactive,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::UserNotFound { .. } => ErrorCode::UserNotFound,
            AppError::PatientNotFound { .. } => ErrorCode::PatientNotFound,
            AppError::UploadNotFound { .. } => ErrorCode::UploadNotFound,
            AppError::AnalysisNotFound { .. } => ErrorCode::AnalysisNotFound,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::Duplicate { .. } => ErrorCode::Duplicate,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::StorageRead { .. } => ErrorCode::StorageReadError,
            AppError::Inference { .. } => ErrorCode::InferenceError,
            AppError::InferenceTimeout { .. } => ErrorCode::InferenceTimeout,
            AppError::ReportRender { .. } => ErrorCode::ReportRenderError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFileType { .. }
            | AppError::InvalidReference { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. }
            | AppError::InvalidToken
            | AppError::ExpiredToken
            | AppError::AccountInactive => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::UserNotFound { .. }
            | AppError::PatientNotFound { .. }
            | AppError::UploadNotFound { .. }
            | AppError::AnalysisNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict { .. }
            | AppError::Duplicate { .. }
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Storage { .. }
            | AppError::StorageRead { .. }
            | AppError::Inference { .. }
            | AppError::ReportRender { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::InferenceTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Whether the failure is transient and a later attempt might succeed.
    ///
    /// Nothing retries automatically; callers surface this to operators.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Inference { retryable, .. } => *retryable,
            AppError::InferenceTimeout { .. }
            | AppError::Storage { .. }
            | AppError::DatabaseConnection { .. } => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            AppError::MissingField { field } => Some(field.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            message,
            error: ErrorDetails {
                code,
                numeric_code: code.as_code(),
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<lopdf::Error> for AppError {
    fn from(err: lopdf::Error) -> Self {
        AppError::ReportRender {
            message: err.to_string(),
        }
    }
}
