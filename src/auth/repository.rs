// Credential store: persistence of user records and their refresh-token digests

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{NewUser, User},
};

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, avatar_public_id, cover_image, \
     password_hash, refresh_token_hash, created_at, updated_at";

/// Hash a token using SHA-256; only the digest is ever persisted
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persistence operations the session lifecycle depends on
///
/// Usernames and emails are passed in already lower-cased; implementations
/// still compare case-insensitively.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Find the user whose username OR email matches (either may be omitted)
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AuthError>;

    /// Insert a user; fails with `UsernameOrEmailTaken` on a uniqueness violation
    async fn create(&self, user: NewUser) -> Result<User, AuthError>;

    /// Overwrite (or clear, with `None`) the stored refresh-token digest
    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&str>) -> Result<(), AuthError>;

    /// Replace the stored digest only if it still equals `current`
    ///
    /// Returns `false` when the digest was already rotated or cleared, or the
    /// user is gone. This is the single atomic step of refresh-token rotation.
    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<bool, AuthError>;

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError>;

    /// Point the user at a new avatar and return the updated record
    async fn update_avatar(
        &self,
        id: Uuid,
        url: &str,
        public_id: &str,
    ) -> Result<Option<User>, AuthError>;
}

/// Shared handle to the configured store
pub type DynUserStore = Arc<dyn UserStore>;

/// PostgreSQL-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new PgUserStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users \
             WHERE ($1::TEXT IS NOT NULL AND LOWER(username) = LOWER($1)) \
                OR ($2::TEXT IS NOT NULL AND LOWER(email) = LOWER($2)) \
             LIMIT 1",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users \
             (id, username, email, full_name, avatar, avatar_public_id, cover_image, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.avatar)
        .bind(&user.avatar_public_id)
        .bind(&user.cover_image)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Check for unique constraint violation
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return AuthError::UsernameOrEmailTaken;
                }
            }
            AuthError::DatabaseError(e.to_string())
        })?;

        Ok(created)
    }

    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&str>) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_hash = $3, updated_at = NOW() \
             WHERE id = $1 AND refresh_token_hash = $2",
        )
        .bind(id)
        .bind(current)
        .bind(replacement)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_avatar(
        &self,
        id: Uuid,
        url: &str,
        public_id: &str,
    ) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET avatar = $2, avatar_public_id = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(url)
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

/// Case-insensitive comparison matching SQL `LOWER(a) = LOWER(b)`
fn same_identity(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// In-process user store
///
/// Every mutation happens under one write lock, which gives the same
/// compare-and-swap guarantee for rotation as the conditional SQL update.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AuthError> {
        let users = self.users.read().await;
        let found = users.values().find(|user| {
            username.is_some_and(|u| same_identity(&user.username, u))
                || email.is_some_and(|e| same_identity(&user.email, e))
        });
        Ok(found.cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let mut users = self.users.write().await;
        let taken = users.values().any(|existing| {
            same_identity(&existing.username, &user.username)
                || same_identity(&existing.email, &user.email)
        });
        if taken {
            return Err(AuthError::UsernameOrEmailTaken);
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            avatar_public_id: user.avatar_public_id,
            cover_image: user.cover_image,
            password_hash: user.password_hash,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&str>) -> Result<(), AuthError> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.refresh_token_hash = hash.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.refresh_token_hash.as_deref() == Some(current) => {
                user.refresh_token_hash = Some(replacement.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.password_hash = hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_avatar(
        &self,
        id: Uuid,
        url: &str,
        public_id: &str,
    ) -> Result<Option<User>, AuthError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.avatar = url.to_string();
            user.avatar_public_id = public_id.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}
