//! Blob storage collaborator
//!
//! Durable home for merged audio artifacts. The default implementation keeps
//! files under `<root>/audio/` and composes URLs from a configured public
//! base, standing in for a cloud bucket.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::ServiceError;

/// Blob-store client: copy a local file to durable storage, get back a URL
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        source: &Path,
        dest_name: &str,
        content_type: &str,
    ) -> Result<String, ServiceError>;
}

/// Filesystem-backed blob store
pub struct LocalBlobStore {
    audio_dir: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(audio_dir: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            audio_dir,
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        source: &Path,
        dest_name: &str,
        content_type: &str,
    ) -> Result<String, ServiceError> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let dest = self.audio_dir.join(dest_name);
        let bytes = tokio::fs::copy(source, &dest).await?;

        let url = format!(
            "{}/audio/{}",
            self.public_base_url.trim_end_matches('/'),
            dest_name
        );
        tracing::info!(
            dest = %dest.display(),
            bytes,
            content_type,
            url = %url,
            "Stored artifact in blob store"
        );
        Ok(url)
    }
}
