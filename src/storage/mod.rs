//! Poll cover images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported image type '{0}'")]
    UnsupportedType(String),

    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("image is empty")]
    Empty,

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// File extension for an accepted image content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the bytes and return the public URL of the stored image.
    async fn put(&self, content_type: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Remove an image previously returned by `put`. Unknown URLs are ignored.
    async fn remove(&self, url: &str) -> Result<(), StorageError>;
}

/// Stores images as files in a directory served under `/uploads`.
pub struct LocalImageStore {
    root: PathBuf,
    base_url: String,
    max_bytes: usize,
}

pub const UPLOADS_ROUTE: &str = "/uploads";

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn url_for(&self, file_name: &str) -> String {
        format!("{}{}/{}", self.base_url, UPLOADS_ROUTE, file_name)
    }

    /// File name behind a URL this store produced, if any.
    fn file_name_of<'a>(&self, url: &'a str) -> Option<&'a str> {
        let prefix = format!("{}{}/", self.base_url, UPLOADS_ROUTE);
        let name = url.strip_prefix(&prefix)?;
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !name.contains("..");
        valid.then_some(name)
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, content_type: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let ext = extension_for(content_type)
            .ok_or_else(|| StorageError::UnsupportedType(content_type.to_string()))?;
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge { size: bytes.len(), limit: self.max_bytes });
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::write(self.root.join(&file_name), bytes).await?;
        info!("Stored image {} ({} bytes)", file_name, bytes.len());

        Ok(self.url_for(&file_name))
    }

    async fn remove(&self, url: &str) -> Result<(), StorageError> {
        let Some(name) = self.file_name_of(url) else {
            warn!("Not removing image outside the upload dir: {}", url);
            return Ok(());
        };
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
