// Authentication error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::error::ApiError;

/// Failures of the session lifecycle
///
/// The variants are finer grained than the client-facing taxonomy so that
/// logs say what actually went wrong; `From<AuthError> for ApiError` collapses
/// them into the five response categories.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    ValidationError(String),

    #[error("User with email or username already exists")]
    UsernameOrEmailTaken,

    #[error("User does not exist")]
    UserNotFound,

    #[error("Invalid user credentials")]
    InvalidCredentials,

    #[error("Unauthorized request")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    /// The presented refresh token verified but is not the one on record
    #[error("Refresh token is expired or used")]
    StaleRefreshToken,

    /// A verified token names an identity that no longer exists
    #[error("Token does not belong to an active user")]
    UnknownIdentity,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Password hashing error: {0}")]
    PasswordHashError(String),

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),

    #[error("Upload storage error: {0}")]
    UploadError(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AuthError::UsernameOrEmailTaken => StatusCode::CONFLICT,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::StaleRefreshToken
            | AuthError::UnknownIdentity => StatusCode::UNAUTHORIZED,
            AuthError::DatabaseError(_)
            | AuthError::PasswordHashError(_)
            | AuthError::TokenGenerationError(_)
            | AuthError::UploadError(_)
            | AuthError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let message = error.to_string();
        match error {
            AuthError::ValidationError(_) => ApiError::ValidationError(message),
            AuthError::UsernameOrEmailTaken => ApiError::Conflict(message),
            AuthError::UserNotFound => ApiError::NotFound(message),
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::StaleRefreshToken
            | AuthError::UnknownIdentity => ApiError::Unauthorized(message),
            AuthError::DatabaseError(_)
            | AuthError::PasswordHashError(_)
            | AuthError::TokenGenerationError(_)
            | AuthError::UploadError(_)
            | AuthError::Timeout(_) => ApiError::InternalError(message),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        AuthError::DatabaseError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(crate::validation::describe(&errors))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
