//! Blob storage for call recordings.
//!
//! [`LocalBlobStore`] keeps objects on disk under `<root>/<bucket>/<name>` and
//! issues HMAC-style signed links that the gateway verifies before serving.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Errors from blob storage.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid object name: {0}")]
    InvalidName(String),
    #[error("signature rejected")]
    BadSignature,
    #[error("signed link expired")]
    Expired,
}

/// Object storage for recordings.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` as `bucket/name`, replacing any existing object.
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError>;

    /// A link to `bucket/name` valid for `ttl`.
    async fn signed_url(&self, bucket: &str, name: &str, ttl: Duration)
    -> Result<String, BlobError>;
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
    secret: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: &str, secret: &str) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
            secret: secret.to_owned(),
        }
    }

    /// On-disk location of an object, rejecting names that escape the root.
    pub fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, BlobError> {
        for part in [bucket, name] {
            let safe = !part.is_empty()
                && Path::new(part)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
                && !part.contains('/');
            if !safe {
                return Err(BlobError::InvalidName(part.to_owned()));
            }
        }
        Ok(self.root.join(bucket).join(name))
    }

    /// Read an object after checking its link signature against `now`
    /// (seconds since the Unix epoch).
    pub async fn read_signed(
        &self,
        bucket: &str,
        name: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<Vec<u8>, BlobError> {
        if sign(&self.secret, bucket, name, expires) != signature {
            return Err(BlobError::BadSignature);
        }
        if now > expires {
            return Err(BlobError::Expired);
        }
        let path = self.object_path(bucket, name)?;
        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError> {
        let path = self.object_path(bucket, name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(bucket, name, content_type, size = bytes.len(), "blob stored");
        Ok(())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        name: &str,
        ttl: Duration,
    ) -> Result<String, BlobError> {
        self.object_path(bucket, name)?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = chrono::Utc::now().timestamp().saturating_add(ttl_secs);
        let signature = sign(&self.secret, bucket, name, expires);
        Ok(format!(
            "{}/{}/{}?expires={expires}&signature={signature}",
            self.public_base_url,
            urlencoding::encode(bucket),
            urlencoding::encode(name),
        ))
    }
}

fn sign(secret: &str, bucket: &str, name: &str, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b"|");
    hasher.update(bucket.as_bytes());
    hasher.update(b"/");
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(expires.to_string().as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}
