// Authentication middleware for protected routes

use axum::{
    async_trait,
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::debug;
use uuid::Uuid;

use crate::auth::{cookies::ACCESS_TOKEN_COOKIE, error::AuthError, models::UserResponse};
use crate::AppState;

/// Pull the access token from the `accessToken` cookie, falling back to an
/// `Authorization: Bearer` header
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|token| token.trim().to_owned())
                .filter(|token| !token.is_empty())
        })
}

/// Authenticated user extractor for protected routes
///
/// Resolves the access token to a stored user (never including the password
/// hash or refresh token). Handlers take it as a parameter; there is no other
/// way to learn who is calling.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub user: UserResponse,
}

impl AuthenticatedUser {
    async fn resolve(headers: &HeaderMap, state: &AppState) -> Result<Self, AuthError> {
        let token = extract_access_token(headers);
        let user = state.auth_service.authenticate(token.as_deref()).await?;

        Ok(Self {
            user_id: user.id,
            user,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by `require_auth`
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(user);
        }

        let state = AppState::from_ref(state);
        let user = Self::resolve(&parts.headers, &state).await?;
        parts.extensions.insert(user.clone());

        Ok(user)
    }
}

/// Middleware that rejects unauthenticated requests before they reach a handler
///
/// # Usage
/// ```ignore
/// let protected = Router::new()
///     .route("/logout", post(logout_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let endpoint = request.uri().path().to_string();
    let user = AuthenticatedUser::resolve(request.headers(), &state).await?;

    debug!("Authorized user {} for {}", user.user_id, endpoint);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
