//! Object storage for product images.
//!
//! Objects are addressed as `{collection}/{millis}_{file_name}` and served
//! back under a public URL. Uploads report progress as the fraction of
//! bytes written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, watch};

use right_water_core::authz::Collection;

/// Bytes written between progress reports.
const CHUNK_SIZE: usize = 64 * 1024;

/// Errors from the blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The path escapes the store or is empty.
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where an object lives inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPath(String);

impl BlobPath {
    /// Path for a fresh upload: `{collection}/{millis}_{file_name}`.
    ///
    /// The file name is reduced to characters safe in a URL path.
    #[must_use]
    pub fn for_upload(collection: Collection, file_name: &str, now: DateTime<Utc>) -> Self {
        let sanitized: String = file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let sanitized = sanitized.trim_start_matches('.');
        let name = if sanitized.is_empty() { "upload" } else { sanitized };
        Self(format!("{collection}/{}_{name}", now.timestamp_millis()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The collection segment of the path.
    #[must_use]
    pub fn collection(&self) -> Option<Collection> {
        self.0.split('/').next()?.parse().ok()
    }
}

/// Progress of the current upload, as a fraction in `0.0..=1.0`.
///
/// `None` when nothing is uploading.
#[derive(Clone)]
pub struct UploadProgress {
    fraction: watch::Sender<Option<f64>>,
}

impl UploadProgress {
    #[must_use]
    pub fn new() -> Self {
        let (fraction, _) = watch::channel(None);
        Self { fraction }
    }

    #[allow(clippy::cast_precision_loss)]
    fn report(&self, written: usize, total: usize) {
        let fraction = if total == 0 {
            1.0
        } else {
            written as f64 / total as f64
        };
        self.fraction.send_replace(Some(fraction));
    }

    /// Mark the upload as finished.
    pub fn clear(&self) {
        self.fraction.send_replace(None);
    }

    #[must_use]
    pub fn current(&self) -> Option<f64> {
        *self.fraction.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.fraction.subscribe()
    }
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// The blob store boundary.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return the public URL.
    async fn put(
        &self,
        path: &BlobPath,
        content_type: &str,
        bytes: &[u8],
        progress: &UploadProgress,
    ) -> Result<String, BlobError>;
}

/// Blob store on the local file system, served by the `/media` route.
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    fn resolve(&self, path: &BlobPath) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path.as_str());
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe || path.as_str().is_empty() {
            return Err(BlobError::InvalidPath(path.as_str().to_owned()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        path: &BlobPath,
        content_type: &str,
        bytes: &[u8],
        progress: &UploadProgress,
    ) -> Result<String, BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&target).await?;
        let mut written = 0;
        progress.report(0, bytes.len());
        for chunk in bytes.chunks(CHUNK_SIZE) {
            file.write_all(chunk).await?;
            written += chunk.len();
            progress.report(written, bytes.len());
        }
        file.flush().await?;

        tracing::info!(path = path.as_str(), content_type, size = bytes.len(), "blob stored");
        Ok(format!("{}/{}", self.public_prefix, path.as_str()))
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        path: &BlobPath,
        content_type: &str,
        bytes: &[u8],
        progress: &UploadProgress,
    ) -> Result<String, BlobError> {
        let mut written = 0;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            written += chunk.len();
            progress.report(written, bytes.len());
        }
        self.objects.write().await.insert(
            path.as_str().to_owned(),
            (content_type.to_owned(), bytes.to_vec()),
        );
        Ok(format!("memory://{}", path.as_str()))
    }
}
