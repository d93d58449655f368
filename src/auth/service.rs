// Authentication service - business logic layer

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, NewUser, RegisterRequest, TokenPair,
        User, UserResponse,
    },
    password::PasswordService,
    repository::{hash_token, DynUserStore},
    token::TokenService,
};
use crate::media::{MediaHost, UploadedAsset};

/// Authentication service coordinating all session operations
///
/// Lifecycle per user: anonymous until `login`, authenticated while a refresh
/// token digest is on record, rotated on every `refresh_tokens`, logged out
/// once `logout` clears the digest. Only the most recently issued refresh
/// token is ever accepted.
#[derive(Clone)]
pub struct AuthService {
    store: DynUserStore,
    media: Arc<dyn MediaHost>,
    password_service: PasswordService,
    token_service: TokenService,
    call_timeout: Duration,
}

impl AuthService {
    /// Create a new AuthService
    pub fn new(
        store: DynUserStore,
        media: Arc<dyn MediaHost>,
        password_service: PasswordService,
        token_service: TokenService,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            media,
            password_service,
            token_service,
            call_timeout,
        }
    }

    pub fn token_service(&self) -> &TokenService {
        &self.token_service
    }

    /// Register a new user
    ///
    /// 1. Rejects blank or malformed fields
    /// 2. Rejects a username or email that is already taken
    /// 3. Requires and uploads the avatar; the cover image is optional
    /// 4. Stores the user with a hashed password
    pub async fn register(
        &self,
        request: RegisterRequest,
        avatar: Option<&Path>,
        cover_image: Option<&Path>,
    ) -> Result<UserResponse, AuthError> {
        if request.has_blank_field() {
            return Err(AuthError::ValidationError("All fields are required".to_string()));
        }

        // Validation sees the stored form; the password is kept byte-exact
        let request = RegisterRequest {
            username: normalize(&request.username),
            email: normalize(&request.email),
            full_name: request.full_name.trim().to_string(),
            password: request.password,
        };
        request.validate()?;

        let username = request.username.clone();
        let email = request.email.clone();

        let existing = self
            .bounded(
                "user lookup",
                self.store.find_by_username_or_email(Some(&username), Some(&email)),
            )
            .await?;
        if existing.is_some() {
            warn!("Registration rejected, username or email taken: {}", username);
            return Err(AuthError::UsernameOrEmailTaken);
        }

        let avatar_path = avatar
            .ok_or_else(|| AuthError::ValidationError("Avatar is required".to_string()))?;
        let avatar = self
            .upload("avatar upload", avatar_path)
            .await?
            .ok_or_else(|| AuthError::ValidationError("Avatar could not be uploaded".to_string()))?;

        let cover = match cover_image {
            Some(path) => {
                let uploaded = self.upload("cover image upload", path).await?;
                if uploaded.is_none() {
                    warn!("Cover image upload failed for {}, continuing without it", username);
                }
                uploaded
            }
            None => None,
        };

        let password_hash = match self.hash_password(request.password).await {
            Ok(hash) => hash,
            Err(e) => {
                self.discard_uploads(&avatar, cover.as_ref()).await;
                return Err(e);
            }
        };

        let new_user = NewUser {
            username,
            email,
            full_name: request.full_name,
            avatar: avatar.url.clone(),
            avatar_public_id: avatar.public_id.clone(),
            cover_image: cover.as_ref().map(|c| c.url.clone()).unwrap_or_default(),
            password_hash,
        };

        let user = match self.bounded("user insert", self.store.create(new_user)).await {
            Ok(user) => user,
            Err(e) => {
                self.discard_uploads(&avatar, cover.as_ref()).await;
                return Err(e);
            }
        };

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user.into())
    }

    /// Login a user by username or email
    ///
    /// Issues a fresh token pair and records its refresh token, replacing any
    /// previous one, so at most one session per user stays refreshable.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let username = request.username.as_deref().map(normalize).filter(|u| !u.is_empty());
        let email = request.email.as_deref().map(normalize).filter(|e| !e.is_empty());

        if username.is_none() && email.is_none() {
            return Err(AuthError::ValidationError("Username or email is required".to_string()));
        }
        if request.password.trim().is_empty() {
            return Err(AuthError::ValidationError("Password is required".to_string()));
        }

        let user = self
            .bounded(
                "user lookup",
                self.store
                    .find_by_username_or_email(username.as_deref(), email.as_deref()),
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.verify_password(request.password, user.password_hash.clone()).await? {
            warn!("Failed login for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.start_session(&user).await?;

        info!("User {} logged in", user.id);
        Ok(AuthResponse {
            user: user.into(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Forget the user's refresh token; safe to call repeatedly
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.bounded("session clear", self.store.set_refresh_token_hash(user_id, None))
            .await?;

        info!("User {} logged out", user_id);
        Ok(())
    }

    /// Exchange the current refresh token for a new token pair
    ///
    /// The presented token must verify against the refresh secret AND be the
    /// one on record. Rotation is a compare-and-swap on the stored digest, so
    /// of several concurrent refreshes with the same token only one succeeds.
    pub async fn refresh_tokens(&self, presented: Option<&str>) -> Result<TokenPair, AuthError> {
        let presented = presented
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.token_service.verify_refresh_token(presented)?;

        let user = self
            .bounded("user lookup", self.store.find_by_id(claims.sub))
            .await?
            .ok_or(AuthError::UnknownIdentity)?;

        let presented_hash = hash_token(presented);
        if user.refresh_token_hash.as_deref() != Some(presented_hash.as_str()) {
            warn!("Stale or revoked refresh token presented for user {}", user.id);
            return Err(AuthError::StaleRefreshToken);
        }

        let tokens = self.token_service.issue_token_pair(&user)?;
        let rotated = self
            .bounded(
                "token rotation",
                self.store.rotate_refresh_token_hash(
                    user.id,
                    &presented_hash,
                    &hash_token(&tokens.refresh_token),
                ),
            )
            .await?;

        if !rotated {
            warn!("Refresh token for user {} was rotated concurrently", user.id);
            return Err(AuthError::StaleRefreshToken);
        }

        info!("Rotated tokens for user {}", user.id);
        Ok(tokens)
    }

    /// Change the password of an authenticated user
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let user = self
            .bounded("user lookup", self.store.find_by_id(user_id))
            .await?
            .ok_or(AuthError::UnknownIdentity)?;

        if !self.verify_password(request.old_password, user.password_hash).await? {
            warn!("Password change for user {} rejected: wrong current password", user_id);
            return Err(AuthError::InvalidCredentials);
        }

        if request.new_password.trim().is_empty() {
            return Err(AuthError::ValidationError("New password is required".to_string()));
        }
        if request.new_password != request.confirm_password {
            return Err(AuthError::ValidationError("Passwords do not match".to_string()));
        }

        let password_hash = self.hash_password(request.new_password).await?;
        self.bounded(
            "password update",
            self.store.update_password_hash(user_id, &password_hash),
        )
        .await?;

        info!("User {} changed password", user_id);
        Ok(())
    }

    /// Resolve an access token to the user it belongs to
    ///
    /// Every protected endpoint goes through here.
    pub async fn authenticate(&self, access_token: Option<&str>) -> Result<UserResponse, AuthError> {
        let token = access_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.token_service.verify_access_token(token)?;

        let user = self
            .bounded("user lookup", self.store.find_by_id(claims.sub))
            .await?
            .ok_or(AuthError::UnknownIdentity)?;

        debug!("Authenticated user {}", user.id);
        Ok(user.into())
    }

    /// Get current user information
    pub async fn get_current_user(&self, user_id: Uuid) -> Result<UserResponse, AuthError> {
        self.bounded("user lookup", self.store.find_by_id(user_id))
            .await?
            .map(UserResponse::from)
            .ok_or(AuthError::UnknownIdentity)
    }

    /// Replace the user's avatar; the old asset is deleted best-effort
    pub async fn update_avatar(
        &self,
        user_id: Uuid,
        avatar: Option<&Path>,
    ) -> Result<UserResponse, AuthError> {
        let avatar_path = avatar
            .ok_or_else(|| AuthError::ValidationError("Avatar file is missing".to_string()))?;

        let current = self
            .bounded("user lookup", self.store.find_by_id(user_id))
            .await?
            .ok_or(AuthError::UnknownIdentity)?;

        let uploaded = self
            .upload("avatar upload", avatar_path)
            .await?
            .ok_or_else(|| AuthError::ValidationError("Avatar could not be uploaded".to_string()))?;

        let updated = self
            .bounded(
                "avatar update",
                self.store.update_avatar(user_id, &uploaded.url, &uploaded.public_id),
            )
            .await?;

        let Some(updated) = updated else {
            self.delete_asset_best_effort(&uploaded.public_id).await;
            return Err(AuthError::UnknownIdentity);
        };

        if current.avatar_public_id != uploaded.public_id {
            self.delete_asset_best_effort(&current.avatar_public_id).await;
        }

        info!("User {} updated avatar", user_id);
        Ok(updated.into())
    }

    /// Issue a token pair and make its refresh token the only valid one
    async fn start_session(&self, user: &User) -> Result<TokenPair, AuthError> {
        let tokens = self.token_service.issue_token_pair(user)?;
        let digest = hash_token(&tokens.refresh_token);

        self.bounded(
            "session store",
            self.store.set_refresh_token_hash(user.id, Some(&digest)),
        )
        .await?;

        Ok(tokens)
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.password_service.clone();
        let task = tokio::task::spawn_blocking(move || hasher.hash_password(&password));

        self.bounded("password hashing", async move {
            task.await
                .map_err(|e| AuthError::PasswordHashError(e.to_string()))?
        })
        .await
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.password_service.clone();
        let task = tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash));

        self.bounded("password verification", async move {
            task.await
                .map_err(|e| AuthError::PasswordHashError(e.to_string()))
        })
        .await
    }

    /// Run an external call with the configured upper bound on its duration
    async fn bounded<T, F>(&self, operation: &'static str, future: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        tokio::time::timeout(self.call_timeout, future)
            .await
            .map_err(|_| AuthError::Timeout(operation))?
    }

    async fn upload(
        &self,
        operation: &'static str,
        path: &Path,
    ) -> Result<Option<UploadedAsset>, AuthError> {
        self.bounded(operation, async { Ok(self.media.upload(path).await) })
            .await
    }

    async fn delete_asset_best_effort(&self, public_id: &str) {
        if public_id.is_empty() {
            return;
        }

        match tokio::time::timeout(self.call_timeout, self.media.delete(public_id)).await {
            Ok(Ok(())) => debug!("Deleted media asset {}", public_id),
            Ok(Err(e)) => warn!("Could not delete media asset {}: {}", public_id, e),
            Err(_) => warn!("Timed out deleting media asset {}", public_id),
        }
    }

    async fn discard_uploads(&self, avatar: &UploadedAsset, cover: Option<&UploadedAsset>) {
        self.delete_asset_best_effort(&avatar.public_id).await;
        if let Some(cover) = cover {
            self.delete_asset_best_effort(&cover.public_id).await;
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
