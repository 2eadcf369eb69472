//! The object-store collaborator: path-addressed blobs with public URLs.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Cache lifetime for immutable uploads (one year).
pub const LONG_LIVED_CACHE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object `{key}` already exists in bucket `{bucket}`")]
    ObjectAlreadyExists { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: String,
    /// Overwrite an existing object instead of failing.
    pub upsert: bool,
}

impl PutOptions {
    /// Immutable WebP encoding.
    pub fn webp() -> Self {
        Self::immutable("image/webp")
    }

    pub fn immutable(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            cache_control: LONG_LIVED_CACHE.into(),
            upsert: false,
        }
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }
}

/// Blob storage used by the upload pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `path`.
    async fn upload(&self, path: &str, bytes: Bytes, options: &PutOptions) -> StorageResult<()>;

    /// Read the whole payload at `path`.
    async fn download(&self, path: &str) -> StorageResult<Bytes>;

    /// Cheap existence probe.
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Remove every path in one batch. Missing paths are skipped; returns how
    /// many objects were actually removed.
    async fn remove(&self, paths: &[String]) -> StorageResult<usize>;

    /// Public URL of the object at `path`.
    fn public_url(&self, path: &str) -> String;

    /// Inverse of [`ObjectStore::public_url`]; `None` for foreign URLs.
    fn path_from_public_url(&self, url: &str) -> Option<String>;
}

/// Best-guess MIME type for an upload kept in its original format.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_uploads_do_not_overwrite() {
        let options = PutOptions::webp();
        assert_eq!(options.content_type, "image/webp");
        assert_eq!(options.cache_control, LONG_LIVED_CACHE);
        assert!(!options.upsert);
        assert!(options.upsert().upsert);
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for_extension("JPG"), "image/jpeg");
        assert_eq!(content_type_for_extension("png"), "image/png");
        assert_eq!(content_type_for_extension("xyz"), "application/octet-stream");
    }
}
