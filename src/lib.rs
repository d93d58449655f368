pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod response;
pub mod validation;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use auth::{
    AuthResponse, AuthService, ChangePasswordRequest, LoginRequest, RefreshRequest,
    RegisterRequest, SessionCookies, TokenPair, UserResponse,
};
use config::ServerConfig;
use response::ApiResponse;

/// Largest accepted request body (multipart uploads included)
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::handlers::register_handler,
        auth::handlers::login_handler,
        auth::handlers::logout_handler,
        auth::handlers::refresh_handler,
        auth::handlers::change_password_handler,
        auth::handlers::current_user_handler,
        auth::handlers::update_avatar_handler,
    ),
    components(
        schemas(
            AuthResponse,
            ChangePasswordRequest,
            LoginRequest,
            RefreshRequest,
            RegisterRequest,
            TokenPair,
            UserResponse
        )
    ),
    tags(
        (name = "users", description = "Registration, login and session management")
    ),
    info(
        title = "VidTube API",
        version = "1.0.0",
        description = "Accounts and sessions for the VidTube video platform"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub cookies: SessionCookies,
}

impl AppState {
    pub fn new(auth_service: AuthService, cookies: SessionCookies) -> Self {
        Self {
            auth_service: Arc::new(auth_service),
            cookies,
        }
    }
}

/// Handler for GET /health
async fn health_handler() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "ok" }), "Service is healthy")
}

/// Creates the API router
/// Public session endpoints, protected endpoints behind `require_auth`, and Swagger UI
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler))
        .route("/refresh-token", post(auth::refresh_handler));

    let protected = Router::new()
        .route("/logout", post(auth::logout_handler))
        .route("/change-password", post(auth::change_password_handler))
        .route(
            "/current-user",
            get(auth::current_user_handler).post(auth::current_user_handler),
        )
        .route("/avatar", patch(auth::update_avatar_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_handler))
        .nest("/api/v1/users", public.merge(protected))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Full application: API router, uploaded media under `/media`, and CORS
pub fn build_app(state: AppState, server: &ServerConfig, media_root: &Path) -> Router {
    create_router(state)
        .nest_service("/media", ServeDir::new(media_root))
        .layer(cors_layer(server.cors_origin.as_deref()))
}

/// CORS policy; a configured origin also allows credentials (the session cookies)
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}
