// Media hosting collaborator
// Uploaded avatars and cover images are handed to a MediaHost, which returns a public URL

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A stored asset as reported by the media host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid public id '{0}'")]
    InvalidPublicId(String),
}

/// External media storage
///
/// `upload` is best-effort and reports failure as `None`; callers decide
/// whether a missing asset is fatal. `delete` failures are meant to be
/// logged, not propagated to clients.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Option<UploadedAsset>;

    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

/// Media host backed by a local directory that the router serves under `/media`
pub struct LocalMediaHost {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaHost {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create the storage directory if it does not exist yet
    pub async fn ensure_root(&self) -> Result<(), MediaError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn is_valid_public_id(public_id: &str) -> bool {
        !public_id.is_empty()
            && public_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
            && !public_id.starts_with('.')
    }
}

#[async_trait]
impl MediaHost for LocalMediaHost {
    async fn upload(&self, local_path: &Path) -> Option<UploadedAsset> {
        let extension = local_path
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();
        let public_id = format!("{}{}", Uuid::new_v4().simple(), extension);
        let destination = self.root.join(&public_id);

        match tokio::fs::copy(local_path, &destination).await {
            Ok(bytes) => {
                info!("Stored media asset {} ({} bytes)", public_id, bytes);
                Some(UploadedAsset {
                    url: format!("{}/{}", self.base_url, public_id),
                    public_id,
                })
            }
            Err(e) => {
                warn!("Media upload from {} failed: {}", local_path.display(), e);
                None
            }
        }
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        if !Self::is_valid_public_id(public_id) {
            return Err(MediaError::InvalidPublicId(public_id.to_string()));
        }

        tokio::fs::remove_file(self.root.join(public_id)).await?;
        debug!("Deleted media asset {}", public_id);
        Ok(())
    }
}
