//! Object storage for uploaded customer module images.
//!
//! [`ObjectStore`] is the seam the upload handler talks to. The only
//! implementation shipped is [`LocalObjectStore`], which keeps objects below
//! a root directory and serves them back through `/uploads/{*path}`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

/// Prefix under which every customer module image is stored.
pub const IMAGE_PREFIX: &str = "customer-module-images";

/// Default upload limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Where an object ended up and how clients can fetch it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, BoardError>;

    /// `Ok(None)` when nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Option<ObjectData>, BoardError>;
}

// ── Upload policy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Check the size and declared content type of an upload.
    pub fn validate(&self, content_type: &str, size: usize) -> Result<(), BoardError> {
        if size > self.max_bytes {
            return Err(BoardError::UploadTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(BoardError::UnsupportedMediaType(content_type.to_string()));
        }
        Ok(())
    }
}

/// Build a unique object path: `customer-module-images/{millis}-{random}.{ext}`.
///
/// The extension follows the validated content type, never the client's
/// file name, since objects are served back with a type guessed from it.
pub fn image_object_path(content_type: &str) -> String {
    let ext = extension_for(content_type);
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{IMAGE_PREFIX}/{millis}-{}.{ext}", &random[..8])
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => "bin",
    }
}

/// Reject absolute paths and any path that could step outside the store root.
pub fn validate_object_path(path: &str) -> Result<(), BoardError> {
    if path.is_empty() || path.contains("..") || path.starts_with('/') || path.contains('\\') {
        return Err(BoardError::Validation("Invalid path".to_string()));
    }
    Ok(())
}

// ── Local filesystem store ────────────────────────────────────────────

pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, BoardError> {
        validate_object_path(path)?;
        let full_path = self.root.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| BoardError::Storage {
                    path: path.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&full_path, &bytes)
            .await
            .map_err(|source| BoardError::Storage {
                path: path.to_string(),
                source,
            })?;

        tracing::info!(path, size = bytes.len(), content_type, "stored object");
        Ok(StoredObject {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    async fn get(&self, path: &str) -> Result<Option<ObjectData>, BoardError> {
        validate_object_path(path)?;
        let full_path = self.root.join(path);

        match tokio::fs::read(&full_path).await {
            Ok(bytes) => {
                let content_type = mime_guess::from_path(&full_path)
                    .first_or_octet_stream()
                    .to_string();
                Ok(Some(ObjectData {
                    bytes,
                    content_type,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BoardError::Storage {
                path: path.to_string(),
                source,
            }),
        }
    }
}
