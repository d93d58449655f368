// JWT token generation and validation service

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{
        error::AuthError,
        models::{TokenPair, User},
    },
    config::TokenConfig,
};

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub iat: i64, // issued at timestamp
    pub exp: i64, // expiration timestamp
}

/// Refresh token claims
///
/// `jti` makes every refresh token unique, even two issued for the same user
/// within the same second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Token service for JWT operations
///
/// Access and refresh tokens are signed with different secrets, so a token of
/// one class never verifies as the other.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    access_token_duration: i64,  // in seconds
    refresh_secret: String,
    refresh_token_duration: i64, // in seconds
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access_secret: config.access_secret.clone(),
            access_token_duration: seconds(config.access_ttl),
            refresh_secret: config.refresh_secret.clone(),
            refresh_token_duration: seconds(config.refresh_ttl),
        }
    }

    /// Generate a short-lived access token carrying the user's identity
    pub fn issue_access_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat: now,
            exp: now.saturating_add(self.access_token_duration),
        };

        sign(&claims, &self.access_secret)
    }

    /// Generate a long-lived refresh token
    pub fn issue_refresh_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: user.id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now.saturating_add(self.refresh_token_duration),
        };

        sign(&claims, &self.refresh_secret)
    }

    /// Generate both access and refresh tokens
    pub fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }

    /// Validate an access token against the access secret
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        verify(token, &self.access_secret)
    }

    /// Validate a refresh token against the refresh secret
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        verify(token, &self.refresh_secret)
    }
}

fn seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn sign<C: Serialize>(claims: &C, secret: &str) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
}

/// Check signature and expiry of `token` with `secret` and decode its claims
///
/// Fails with `ExpiredToken` once `exp` has passed (no leeway) and with
/// `InvalidToken` for a bad signature or any malformed input.
pub fn verify<C: DeserializeOwned>(token: &str, secret: &str) -> Result<C, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<C>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken,
        })
}
