// Error handling module for the VidTube API
// Provides the client-facing error taxonomy and its HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

/// Client-facing error taxonomy
///
/// Every failure that leaves a handler is one of these variants. Each maps to
/// exactly one HTTP status code; domain errors such as `AuthError` convert
/// into this type at the response boundary.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed input
    /// Maps to HTTP 400 Bad Request
    ValidationError(String),

    /// Uniqueness violation
    /// Maps to HTTP 409 Conflict
    Conflict(String),

    /// Missing, invalid or stale credentials
    /// Maps to HTTP 401 Unauthorized
    Unauthorized(String),

    /// Referenced resource does not exist
    /// Maps to HTTP 404 Not Found
    NotFound(String),

    /// Unexpected failure in storage, hashing, token signing or a timeout
    /// Maps to HTTP 500 Internal Server Error
    /// Details are logged, never sent to the client
    InternalError(String),
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,

    /// Machine-readable error code (e.g. "VALIDATION_ERROR")
    pub error_code: &'static str,

    /// Human-readable message, safe to show to users
    pub message: String,

    pub success: bool,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    /// Convert to a status code and response body, logging at a level that
    /// matches the severity of the failure
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        let (error_code, message) = match self {
            ApiError::ValidationError(message) => {
                debug!("Validation error: {}", message);
                ("VALIDATION_ERROR", message.clone())
            }
            ApiError::Conflict(message) => {
                warn!("Conflict error: {}", message);
                ("CONFLICT", message.clone())
            }
            ApiError::Unauthorized(message) => {
                warn!("Unauthorized request: {}", message);
                ("UNAUTHORIZED", message.clone())
            }
            ApiError::NotFound(message) => {
                debug!("Resource not found: {}", message);
                ("NOT_FOUND", message.clone())
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                ("INTERNAL_ERROR", "Something went wrong".to_string())
            }
        };

        let status = self.status_code();
        (
            status,
            ErrorResponse {
                status_code: status.as_u16(),
                error_code,
                message,
                success: false,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
