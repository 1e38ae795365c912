//! # Error Handling
//!
//! This module defines custom error types and how they're converted to HTTP responses.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **Purpose**: Forces you to handle both success and failure cases
//! - **No exceptions**: Rust doesn't have try/catch, it uses Result instead
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of failure
//! - **Pattern matching**: Use `match` to handle different error types
//!
//! ### Traits for Error Conversion
//! - **From trait**: Automatically converts between error types (enables `?`)
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Propagation policy:
//! Internal code reports failures through `anyhow::Result`; the HTTP boundary
//! converts them into `AppError`. Client-caused errors (bad upload, bad JSON,
//! unknown id) carry their message into the response, while server-side
//! failures are logged in full and answered with a generic message so raw
//! internals never reach the caller.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **InvalidUpload**: Missing file or disallowed extension (400)
/// - **Validation**: Request data failed validation rules (400)
/// - **NotFound**: Requested resource doesn't exist (404)
/// - **DecodeFailure**: Uploaded audio could not be decoded/resampled (500)
/// - **Transcription**: The transcription job failed as a whole (500)
/// - **Persistence**: The note store rejected a statement (500)
/// - **Config**: Configuration file or environment variable problems (500)
/// - **Internal**: Everything else server-side (500)
#[derive(Debug)]
pub enum AppError {
    /// Missing upload or extension outside the allow-list
    InvalidUpload(String),

    /// User input failed validation rules
    Validation(String),

    /// Requested resource was not found
    NotFound(String),

    /// Audio decode or resample failed; terminal for the job
    DecodeFailure(String),

    /// Whole-job transcription failure (model load, inference setup)
    Transcription(String),

    /// Database insert/update/delete/select failed
    Persistence(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// Internal server errors (I/O, task join failures, etc.)
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidUpload(msg) => write!(f, "Invalid upload: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::DecodeFailure(msg) => write!(f, "Audio decode failure: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription failure: {}", msg),
            AppError::Persistence(msg) => write!(f, "Persistence failure: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Conversion of application errors into HTTP responses.
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "invalid_upload",
///     "message": "File type not allowed",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
///
/// Client-side errors (400/404) echo their message. Server-side errors are
/// logged with full detail here and answered with a fixed message.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::InvalidUpload(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "invalid_upload",
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::DecodeFailure(msg) | AppError::Transcription(msg) => {
                tracing::error!(error = %msg, "transcription job failed");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "transcription_failed",
                    "Error during transcription.".to_string(),
                )
            }
            AppError::Persistence(msg) => {
                tracing::error!(error = %msg, "note store operation failed");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "persistence_failure",
                    "Failed to save changes.".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "configuration error");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "config_error",
                    "Server configuration error.".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error.".to_string(),
                )
            }
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Anyhow errors bubble out of internal code; by the time one crosses the
/// HTTP boundary it is a server-side failure.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always malformed client data, so they map
/// to 400 rather than 500.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Database errors surface as persistence failures.
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// Failures while reading the multipart body are client-side upload problems.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::InvalidUpload(format!("Multipart error: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
///
/// Shorthand for `Result<T, AppError>`, used in handler signatures.
pub type AppResult<T> = Result<T, AppError>;
