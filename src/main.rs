use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vidtube_api::{
    auth::{AuthService, PasswordService, PgUserStore, SessionCookies, TokenService},
    build_app,
    config::AppConfig,
    db,
    media::LocalMediaHost,
    AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG controls verbosity, e.g. RUST_LOG=vidtube_api=debug,tower_http=info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("VidTube API - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");
    tracing::debug!("Token settings: {:?}", config.token);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database, config.external_call_timeout)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let media = LocalMediaHost::new(&config.media.root, &config.media.base_url);
    media
        .ensure_root()
        .await
        .expect("Failed to create media directory");

    let password_service =
        PasswordService::new(config.password).expect("Invalid password hashing parameters");

    let auth_service = AuthService::new(
        Arc::new(PgUserStore::new(db_pool)),
        Arc::new(media),
        password_service,
        TokenService::new(&config.token),
        config.external_call_timeout,
    );
    let state = AppState::new(auth_service, SessionCookies::new(config.server.cookie_secure));

    let app = build_app(state, &config.server, Path::new(&config.media.root));

    // Start the Axum server
    let addr = config.server.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("VidTube API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
