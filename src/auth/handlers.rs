// HTTP handlers for user and session endpoints

use std::collections::HashMap;
use std::path::Path;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::CookieJar;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::auth::{
    cookies::SessionCookies,
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
        TokenPair, UserResponse,
    },
};
use crate::response::ApiResponse;
use crate::AppState;

/// Text fields and spooled files of a multipart request
///
/// Files live in temporary files that are deleted when the form is dropped,
/// i.e. once the handler has finished with them.
#[derive(Default)]
struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, NamedTempFile>,
}

impl MultipartForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AuthError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(invalid_form)?;
                    // Browsers send an empty part for an unselected file input
                    if bytes.is_empty() {
                        continue;
                    }
                    let file = spool(&file_name, &bytes).await?;
                    debug!("Spooled upload '{}' ({} bytes) for field {}", file_name, bytes.len(), name);
                    form.files.insert(name, file);
                }
                None => {
                    let value = field.text().await.map_err(invalid_form)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn file(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(|file| file.path())
    }
}

fn invalid_form(e: axum::extract::multipart::MultipartError) -> AuthError {
    AuthError::ValidationError(format!("Invalid multipart payload: {}", e))
}

async fn spool(file_name: &str, bytes: &[u8]) -> Result<NamedTempFile, AuthError> {
    let suffix = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| AuthError::UploadError(format!("could not create upload file: {}", e)))?;
    tokio::fs::write(file.path(), bytes)
        .await
        .map_err(|e| AuthError::UploadError(format!("could not write upload file: {}", e)))?;

    Ok(file)
}

/// Register a new user
/// POST /api/v1/users/register
#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    request_body(content = RegisterRequest, content_type = "multipart/form-data",
        description = "Account fields plus `avatar` (required) and `coverImage` (optional) files"),
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Missing fields or avatar"),
        (status = 409, description = "Username or email already exists")
    ),
    tag = "users"
)]
pub async fn register_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ApiResponse<UserResponse>, AuthError> {
    let form = MultipartForm::read(multipart).await?;

    let request = RegisterRequest {
        username: form.text("username"),
        email: form.text("email"),
        full_name: form.text("fullName"),
        password: form.text("password"),
    };

    let user = state
        .auth_service
        .register(request, form.file("avatar"), form.file("coverImage"))
        .await?;

    Ok(ApiResponse::new(StatusCode::CREATED, user, "User registered successfully"))
}

/// Login with username or email
/// POST /api/v1/users/login
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; tokens also set as cookies", body = AuthResponse),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "No such user")
    ),
    tag = "users"
)]
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<AuthResponse>), AuthError> {
    let response = state.auth_service.login(request).await?;

    let tokens = TokenPair {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
    };
    let jar = state.cookies.issue(jar, &tokens);

    Ok((jar, ApiResponse::ok(response, "User logged in successfully")))
}

/// Logout the current user
/// POST /api/v1/users/logout
#[utoipa::path(
    post,
    path = "/api/v1/users/logout",
    responses(
        (status = 200, description = "Logged out; token cookies cleared"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "users"
)]
pub async fn logout_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Value>), AuthError> {
    state.auth_service.logout(user.user_id).await?;

    let jar = state.cookies.clear(jar);
    Ok((jar, ApiResponse::ok(json!({}), "User logged out successfully")))
}

/// Rotate the token pair
/// POST /api/v1/users/refresh-token
#[utoipa::path(
    post,
    path = "/api/v1/users/refresh-token",
    request_body(content = RefreshRequest, description = "Optional when the refreshToken cookie is sent"),
    responses(
        (status = 200, description = "New token pair; also set as cookies", body = TokenPair),
        (status = 401, description = "Missing, invalid, expired or already used refresh token")
    ),
    tag = "users"
)]
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, ApiResponse<TokenPair>), AuthError> {
    let presented = SessionCookies::refresh_token(&jar)
        .or_else(|| body.and_then(|Json(request)| request.refresh_token));

    let tokens = state
        .auth_service
        .refresh_tokens(presented.as_deref())
        .await?;

    let jar = state.cookies.issue(jar, &tokens);
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed successfully")))
}

/// Change the current user's password
/// POST /api/v1/users/change-password
#[utoipa::path(
    post,
    path = "/api/v1/users/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "New password missing or not confirmed"),
        (status = 401, description = "Not authenticated or wrong current password")
    ),
    tag = "users"
)]
pub async fn change_password_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<Value>, AuthError> {
    state
        .auth_service
        .change_password(user.user_id, request)
        .await?;

    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

/// Get current user information
/// GET /api/v1/users/current-user
#[utoipa::path(
    get,
    path = "/api/v1/users/current-user",
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "users"
)]
pub async fn current_user_handler(user: AuthenticatedUser) -> ApiResponse<UserResponse> {
    ApiResponse::ok(user.user, "Current user retrieved successfully")
}

/// Replace the current user's avatar
/// PATCH /api/v1/users/avatar
#[utoipa::path(
    patch,
    path = "/api/v1/users/avatar",
    request_body(content = String, content_type = "multipart/form-data",
        description = "`avatar` file"),
    responses(
        (status = 200, description = "Avatar updated", body = UserResponse),
        (status = 400, description = "No avatar file or upload failed"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "users"
)]
pub async fn update_avatar_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<ApiResponse<UserResponse>, AuthError> {
    let form = MultipartForm::read(multipart).await?;

    let updated = state
        .auth_service
        .update_avatar(user.user_id, form.file("avatar"))
        .await?;

    Ok(ApiResponse::ok(updated, "Avatar updated successfully"))
}
