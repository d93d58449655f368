// Shared fixtures for service and HTTP tests: in-memory store, temp media dir, fast hashing

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::auth::{
    AuthService, DynUserStore, InMemoryUserStore, PasswordService, RegisterRequest, TokenService,
    UserResponse,
};
use crate::config::{PasswordConfig, TokenConfig};
use crate::media::{LocalMediaHost, MediaError, MediaHost, UploadedAsset};

pub const ACCESS_SECRET: &str = "test_access_secret_for_testing_purposes";
pub const REFRESH_SECRET: &str = "test_refresh_secret_for_testing_purposes";

pub fn token_config() -> TokenConfig {
    TokenConfig {
        access_secret: ACCESS_SECRET.to_string(),
        access_ttl: Duration::from_secs(900),
        refresh_secret: REFRESH_SECRET.to_string(),
        refresh_ttl: Duration::from_secs(864_000),
    }
}

/// Media host whose deletes always fail, for best-effort cleanup paths
pub struct UndeletableMediaHost(pub LocalMediaHost);

#[async_trait]
impl MediaHost for UndeletableMediaHost {
    async fn upload(&self, local_path: &Path) -> Option<UploadedAsset> {
        self.0.upload(local_path).await
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        Err(MediaError::InvalidPublicId(public_id.to_string()))
    }
}

pub struct TestContext {
    pub service: AuthService,
    pub store: Arc<InMemoryUserStore>,
    pub media_dir: TempDir,
    pub upload_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let media = LocalMediaHost::new(media_dir.path(), "http://localhost:8000/media");
        Self::build(media_dir, Arc::new(media), |store| store as DynUserStore)
    }

    /// Build a context whose service reaches the in-memory store through `wrap`
    pub fn with_store_layer<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryUserStore>) -> DynUserStore,
    {
        let media_dir = tempfile::tempdir().unwrap();
        let media = LocalMediaHost::new(media_dir.path(), "http://localhost:8000/media");
        Self::build(media_dir, Arc::new(media), wrap)
    }

    /// Build a context whose media host cannot delete assets
    pub fn with_undeletable_media() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let media = LocalMediaHost::new(media_dir.path(), "http://localhost:8000/media");
        Self::build(media_dir, Arc::new(UndeletableMediaHost(media)), |store| store as DynUserStore)
    }

    fn build<F>(media_dir: TempDir, media: Arc<dyn MediaHost>, wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryUserStore>) -> DynUserStore,
    {
        let store = Arc::new(InMemoryUserStore::new());
        let password_service = PasswordService::new(PasswordConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();

        let service = AuthService::new(
            wrap(store.clone()),
            media,
            password_service,
            TokenService::new(&token_config()),
            Duration::from_secs(5),
        );

        Self {
            service,
            store,
            media_dir,
            upload_dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Write a fake image into the upload directory and return its path
    pub fn image(&self, name: &str) -> PathBuf {
        let path = self.upload_dir.path().join(name);
        std::fs::write(&path, format!("image bytes of {}", name)).unwrap();
        path
    }

    pub fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            full_name: format!("{} Example", username),
            password: password.to_string(),
        }
    }

    /// Register a user with an avatar, panicking on failure
    pub async fn register(&self, username: &str, email: &str, password: &str) -> UserResponse {
        let avatar = self.image(&format!("{}.png", username));
        self.service
            .register(
                Self::register_request(username, email, password),
                Some(&avatar),
                None,
            )
            .await
            .unwrap()
    }

    /// Number of assets currently held by the media host
    pub fn stored_media_count(&self) -> usize {
        std::fs::read_dir(self.media_dir.path()).unwrap().count()
    }
}
