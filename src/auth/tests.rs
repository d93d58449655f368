// Session lifecycle scenarios against the service with an in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::auth::{
    models::NewUser,
    repository::{hash_token, DynUserStore, InMemoryUserStore, UserStore},
    AuthError, ChangePasswordRequest, LoginRequest, TokenService, User,
};
use crate::test_support::{token_config, TestContext};

/// Store whose `find_by_id` waits until every party of `barrier` has arrived
struct LookupBarrierStore {
    inner: Arc<InMemoryUserStore>,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl UserStore for LookupBarrierStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = self.inner.find_by_id(id).await;
        self.barrier.wait().await;
        user
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AuthError> {
        self.inner.find_by_username_or_email(username, email).await
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        self.inner.create(user).await
    }

    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&str>) -> Result<(), AuthError> {
        self.inner.set_refresh_token_hash(id, hash).await
    }

    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        self.inner.rotate_refresh_token_hash(id, current, replacement).await
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError> {
        self.inner.update_password_hash(id, hash).await
    }

    async fn update_avatar(
        &self,
        id: Uuid,
        url: &str,
        public_id: &str,
    ) -> Result<Option<User>, AuthError> {
        self.inner.update_avatar(id, url, public_id).await
    }
}

fn login_by_username(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: Some(username.to_string()),
        email: None,
        password: password.to_string(),
    }
}

fn change_password(old: &str, new: &str, confirm: &str) -> ChangePasswordRequest {
    ChangePasswordRequest {
        old_password: old.to_string(),
        new_password: new.to_string(),
        confirm_password: confirm.to_string(),
    }
}

fn detached_user() -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        username: "ghost".to_string(),
        email: "ghost@x.com".to_string(),
        full_name: "Ghost".to_string(),
        avatar: String::new(),
        avatar_public_id: String::new(),
        cover_image: String::new(),
        password_hash: String::new(),
        refresh_token_hash: None,
        created_at: now,
        updated_at: now,
    }
}

// ============ register ============

#[tokio::test]
async fn test_register_normalizes_and_hides_secrets() {
    let ctx = TestContext::new();
    let avatar = ctx.image("face.png");

    let user = ctx
        .service
        .register(
            TestContext::register_request("  Alice ", "Alice@X.com", "p1"),
            Some(&avatar),
            None,
        )
        .await
        .unwrap();

    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "alice@x.com");
    assert!(user.avatar.starts_with("http://localhost:8000/media/"));
    assert_eq!(user.cover_image, "");

    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("passwordHash").is_none());
    assert!(json.get("refreshTokenHash").is_none());

    let stored = ctx.store.find_by_id(user.id).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, "p1");
    assert!(stored.password_hash.starts_with("$argon2id$"));
    assert!(!stored.has_active_session());
}

#[tokio::test]
async fn test_register_stores_optional_cover_image() {
    let ctx = TestContext::new();
    let avatar = ctx.image("face.png");
    let cover = ctx.image("banner.jpg");

    let user = ctx
        .service
        .register(
            TestContext::register_request("alice", "alice@x.com", "p1"),
            Some(&avatar),
            Some(&cover),
        )
        .await
        .unwrap();

    assert!(user.cover_image.ends_with(".jpg"));
    assert_eq!(ctx.stored_media_count(), 2);
}

#[tokio::test]
async fn test_register_requires_avatar() {
    let ctx = TestContext::new();

    let result = ctx
        .service
        .register(TestContext::register_request("alice", "alice@x.com", "p1"), None, None)
        .await;

    match result {
        Err(AuthError::ValidationError(message)) => assert_eq!(message, "Avatar is required"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(ctx.stored_media_count(), 0);
}

#[tokio::test]
async fn test_register_rejects_blank_fields() {
    let ctx = TestContext::new();
    let avatar = ctx.image("face.png");

    let result = ctx
        .service
        .register(
            TestContext::register_request("alice", "   ", "p1"),
            Some(&avatar),
            None,
        )
        .await;

    match result {
        Err(AuthError::ValidationError(message)) => assert_eq!(message, "All fields are required"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_register_accepts_padded_fields() {
    let ctx = TestContext::new();
    let avatar = ctx.image("face.png");

    let user = ctx
        .service
        .register(
            TestContext::register_request(" alice ", " alice@x.com ", "p1"),
            Some(&avatar),
            None,
        )
        .await
        .unwrap();

    assert_eq!(user.email, "alice@x.com");
    assert_eq!(user.full_name, "alice  Example");
    let login = LoginRequest {
        username: None,
        email: Some(" alice@x.com ".to_string()),
        password: "p1".to_string(),
    };
    assert!(ctx.service.login(login).await.is_ok());
}

#[tokio::test]
async fn test_register_rejects_malformed_email() {
    let ctx = TestContext::new();
    let avatar = ctx.image("face.png");

    let result = ctx
        .service
        .register(
            TestContext::register_request("alice", "not-an-email", "p1"),
            Some(&avatar),
            None,
        )
        .await;

    assert!(matches!(result, Err(AuthError::ValidationError(_))));
}

#[tokio::test]
async fn test_register_conflicts_on_taken_username_or_email() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;
    let avatar = ctx.image("other.png");

    let same_name = ctx
        .service
        .register(
            TestContext::register_request("ALICE", "other@x.com", "p1"),
            Some(&avatar),
            None,
        )
        .await;
    let same_email = ctx
        .service
        .register(
            TestContext::register_request("bob", "Alice@X.com", "p1"),
            Some(&avatar),
            None,
        )
        .await;

    assert!(matches!(same_name, Err(AuthError::UsernameOrEmailTaken)));
    assert!(matches!(same_email, Err(AuthError::UsernameOrEmailTaken)));
    // Conflicts are detected before anything is uploaded
    assert_eq!(ctx.stored_media_count(), 1);
}

// ============ login ============

#[tokio::test]
async fn test_login_records_digest_of_issued_refresh_token() {
    let ctx = TestContext::new();
    let registered = ctx.register("alice", "alice@x.com", "p1").await;

    let response = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    assert_eq!(response.user, registered);
    let stored = ctx.store.find_by_id(registered.id).await.unwrap().unwrap();
    assert_eq!(
        stored.refresh_token_hash.as_deref(),
        Some(hash_token(&response.refresh_token).as_str())
    );

    let claims = ctx
        .service
        .token_service()
        .verify_access_token(&response.access_token)
        .unwrap();
    assert_eq!(claims.sub, registered.id);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.email, "alice@x.com");
}

#[tokio::test]
async fn test_login_by_email_is_case_insensitive() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;

    let request = LoginRequest {
        username: None,
        email: Some(" ALICE@x.com ".to_string()),
        password: "p1".to_string(),
    };

    assert!(ctx.service.login(request).await.is_ok());
}

#[tokio::test]
async fn test_login_failures() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;

    let unknown = ctx.service.login(login_by_username("nobody", "p1")).await;
    let wrong_password = ctx.service.login(login_by_username("alice", "p2")).await;
    let no_identifier = ctx
        .service
        .login(LoginRequest {
            username: Some("  ".to_string()),
            email: None,
            password: "p1".to_string(),
        })
        .await;
    let no_password = ctx.service.login(login_by_username("alice", "")).await;

    assert!(matches!(unknown, Err(AuthError::UserNotFound)));
    assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
    assert!(matches!(no_identifier, Err(AuthError::ValidationError(_))));
    assert!(matches!(no_password, Err(AuthError::ValidationError(_))));
}

#[tokio::test]
async fn test_second_login_invalidates_first_refresh_token() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;

    let first = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();
    let second = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    let stale = ctx.service.refresh_tokens(Some(&first.refresh_token)).await;
    assert!(matches!(stale, Err(AuthError::StaleRefreshToken)));
    assert!(ctx.service.refresh_tokens(Some(&second.refresh_token)).await.is_ok());
}

// ============ refresh ============

#[tokio::test]
async fn test_refresh_rotation_scenario() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;

    let t1 = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();
    let t2 = ctx.service.refresh_tokens(Some(&t1.refresh_token)).await.unwrap();
    assert_ne!(t2.refresh_token, t1.refresh_token);

    let replay = ctx.service.refresh_tokens(Some(&t1.refresh_token)).await;
    assert!(matches!(replay, Err(AuthError::StaleRefreshToken)));

    let t3 = ctx.service.refresh_tokens(Some(&t2.refresh_token)).await.unwrap();
    assert!(ctx.service.authenticate(Some(&t3.access_token)).await.is_ok());
}

#[tokio::test]
async fn test_refresh_rejects_missing_and_forged_tokens() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;
    let session = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    let missing = ctx.service.refresh_tokens(None).await;
    let blank = ctx.service.refresh_tokens(Some("  ")).await;
    let garbage = ctx.service.refresh_tokens(Some("not.a.jwt")).await;
    // An access token is signed with the other secret
    let access_as_refresh = ctx.service.refresh_tokens(Some(&session.access_token)).await;

    assert!(matches!(missing, Err(AuthError::MissingToken)));
    assert!(matches!(blank, Err(AuthError::MissingToken)));
    assert!(matches!(garbage, Err(AuthError::InvalidToken)));
    assert!(matches!(access_as_refresh, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_refresh_for_unknown_user_is_unauthorized() {
    let ctx = TestContext::new();
    let tokens = TokenService::new(&token_config())
        .issue_token_pair(&detached_user())
        .unwrap();

    let result = ctx.service.refresh_tokens(Some(&tokens.refresh_token)).await;

    assert!(matches!(result, Err(AuthError::UnknownIdentity)));
}

#[tokio::test]
async fn test_concurrent_refresh_with_same_token_succeeds_once() {
    // Both refreshes pass the digest check before either one rotates
    let gate = Arc::new(Barrier::new(2));
    let ctx = TestContext::with_store_layer(move |store| {
        Arc::new(LookupBarrierStore { inner: store, barrier: gate }) as DynUserStore
    });
    ctx.register("alice", "alice@x.com", "p1").await;
    let session = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    let (a, b) = tokio::join!(
        ctx.service.refresh_tokens(Some(&session.refresh_token)),
        ctx.service.refresh_tokens(Some(&session.refresh_token)),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let (winner, failure) = match (a, b) {
        (Ok(tokens), Err(e)) | (Err(e), Ok(tokens)) => (tokens, e),
        other => panic!("expected one success and one failure, got {:?}", other),
    };
    assert!(matches!(failure, AuthError::StaleRefreshToken));

    let stored = ctx.store.find_by_id(session.user.id).await.unwrap().unwrap();
    assert_eq!(
        stored.refresh_token_hash.as_deref(),
        Some(hash_token(&winner.refresh_token).as_str())
    );
}

// ============ logout ============

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;
    let session = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    ctx.service.logout(alice.id).await.unwrap();
    // Idempotent
    ctx.service.logout(alice.id).await.unwrap();

    let stored = ctx.store.find_by_id(alice.id).await.unwrap().unwrap();
    assert!(stored.refresh_token_hash.is_none());
    let result = ctx.service.refresh_tokens(Some(&session.refresh_token)).await;
    assert!(matches!(result, Err(AuthError::StaleRefreshToken)));
}

// ============ change password ============

#[tokio::test]
async fn test_change_password_replaces_credentials() {
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;

    ctx.service
        .change_password(alice.id, change_password("p1", "p2", "p2"))
        .await
        .unwrap();

    let old = ctx.service.login(login_by_username("alice", "p1")).await;
    assert!(matches!(old, Err(AuthError::InvalidCredentials)));
    assert!(ctx.service.login(login_by_username("alice", "p2")).await.is_ok());
}

#[tokio::test]
async fn test_change_password_rejections() {
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;

    let wrong_old = ctx
        .service
        .change_password(alice.id, change_password("nope", "p2", "p2"))
        .await;
    let mismatch = ctx
        .service
        .change_password(alice.id, change_password("p1", "p2", "p3"))
        .await;
    let blank = ctx
        .service
        .change_password(alice.id, change_password("p1", " ", " "))
        .await;
    let unknown = ctx
        .service
        .change_password(Uuid::new_v4(), change_password("p1", "p2", "p2"))
        .await;

    assert!(matches!(wrong_old, Err(AuthError::InvalidCredentials)));
    match mismatch {
        Err(AuthError::ValidationError(message)) => assert_eq!(message, "Passwords do not match"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(matches!(blank, Err(AuthError::ValidationError(_))));
    assert!(matches!(unknown, Err(AuthError::UnknownIdentity)));

    // Nothing changed
    assert!(ctx.service.login(login_by_username("alice", "p1")).await.is_ok());
}

// ============ identity resolution ============

#[tokio::test]
async fn test_authenticate_resolves_access_token() {
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;
    let session = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    let resolved = ctx.service.authenticate(Some(&session.access_token)).await.unwrap();

    assert_eq!(resolved, alice);
    assert_eq!(ctx.service.get_current_user(alice.id).await.unwrap(), alice);
}

#[tokio::test]
async fn test_authenticate_rejections() {
    let ctx = TestContext::new();
    ctx.register("alice", "alice@x.com", "p1").await;
    let session = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();
    let orphan = TokenService::new(&token_config())
        .issue_access_token(&detached_user())
        .unwrap();

    let missing = ctx.service.authenticate(None).await;
    let refresh_as_access = ctx.service.authenticate(Some(&session.refresh_token)).await;
    let unknown_user = ctx.service.authenticate(Some(&orphan)).await;

    assert!(matches!(missing, Err(AuthError::MissingToken)));
    assert!(matches!(refresh_as_access, Err(AuthError::InvalidToken)));
    assert!(matches!(unknown_user, Err(AuthError::UnknownIdentity)));
    for error in [missing, refresh_as_access, unknown_user] {
        assert!(error.unwrap_err().is_unauthorized());
    }
}

#[tokio::test]
async fn test_access_token_stays_valid_after_logout() {
    // Access tokens are stateless until they expire
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;
    let session = ctx.service.login(login_by_username("alice", "p1")).await.unwrap();

    ctx.service.logout(alice.id).await.unwrap();

    assert!(ctx.service.authenticate(Some(&session.access_token)).await.is_ok());
}

// ============ avatar ============

#[tokio::test]
async fn test_update_avatar_replaces_and_deletes_old_asset() {
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;
    let new_avatar = ctx.image("new-face.webp");

    let updated = ctx
        .service
        .update_avatar(alice.id, Some(&new_avatar))
        .await
        .unwrap();

    assert_ne!(updated.avatar, alice.avatar);
    assert!(updated.avatar.ends_with(".webp"));
    assert_eq!(ctx.stored_media_count(), 1);
}

#[tokio::test]
async fn test_update_avatar_tolerates_failed_delete() {
    let ctx = TestContext::with_undeletable_media();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;
    let new_avatar = ctx.image("new-face.png");

    let updated = ctx
        .service
        .update_avatar(alice.id, Some(&new_avatar))
        .await
        .unwrap();

    assert_ne!(updated.avatar, alice.avatar);
    assert_eq!(ctx.stored_media_count(), 2);
}

#[tokio::test]
async fn test_update_avatar_requires_file() {
    let ctx = TestContext::new();
    let alice = ctx.register("alice", "alice@x.com", "p1").await;

    let result = ctx.service.update_avatar(alice.id, None).await;

    match result {
        Err(AuthError::ValidationError(message)) => assert_eq!(message, "Avatar file is missing"),
        other => panic!("expected validation error, got {:?}", other),
    }
}
