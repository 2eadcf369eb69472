//! src/services/storage_service.rs
//!
//! StorageService: the local object store. Metadata lives in SQLite and
//! payloads on disk, sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.
//! Objects are published under
//! `{public_base}/storage/v1/object/public/{bucket}/{key}`, the layout the
//! image URL resolver rewrites.

use crate::imaging::url::OBJECT_MARKER;
use crate::models::object::StoredObject;
use crate::services::object_store::{
    ObjectStore, PutOptions, StorageError, StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// The single bucket this service serves.
    pub bucket: String,

    /// Scheme and authority prefixed to public URLs, e.g. `http://127.0.0.1:3000`.
    pub public_base: String,
}

impl StorageService {
    /// Create a StorageService for `bucket`, rejecting names that would not
    /// make a predictable directory or URL segment.
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base: impl Into<String>,
    ) -> StorageResult<Self> {
        let bucket = bucket.into();
        ensure_bucket_name_safe(&bucket)?;
        Ok(Self {
            db,
            base_path: base_path.into(),
            bucket,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard directories from MD5(bucket/key).
    fn object_shards(&self, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", self.bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/bucket/{shard}/{shard}/{key}. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = self.object_shards(key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }

    async fn fetch_object(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let object = sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket, key, content_type, cache_control, size_bytes, etag, last_modified
             FROM objects
             WHERE bucket = ? AND key = ?",
        )
        .bind(&self.bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(object)
    }

    /// Write a payload and its metadata.
    ///
    /// - Writes to a temporary file, fsyncs, then renames into place.
    /// - Computes MD5/etag and size.
    /// - Fails with ObjectAlreadyExists unless `options.upsert` is set.
    pub async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        options: &PutOptions,
    ) -> StorageResult<StoredObject> {
        self.ensure_key_safe(key)?;
        if !options.upsert && self.fetch_object(key).await?.is_some() {
            return Err(StorageError::ObjectAlreadyExists {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = write_durably(&tmp_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, bucket, key, content_type, cache_control, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                content_type = excluded.content_type,
                cache_control = excluded.cache_control,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket, key, content_type, cache_control, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&self.bucket)
        .bind(key)
        .bind(&options.content_type)
        .bind(&options.cache_control)
        .bind(bytes.len() as i64)
        .bind(format!("{:x}", md5::compute(bytes)))
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!("stored {} ({} bytes)", key, obj.size_bytes);
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open file handle, ready for streaming out.
    ///
    /// Returns ObjectNotFound if metadata exists but the payload is missing.
    pub async fn get_object_reader(&self, key: &str) -> StorageResult<(StoredObject, File)> {
        self.ensure_key_safe(key)?;
        let object = self
            .fetch_object(key)
            .await?
            .ok_or_else(|| self.not_found(key))?;

        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                self.not_found(key)
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Only object metadata.
    pub async fn get_object_metadata(&self, key: &str) -> StorageResult<StoredObject> {
        self.ensure_key_safe(key)?;
        self.fetch_object(key)
            .await?
            .ok_or_else(|| self.not_found(key))
    }

    /// Hard-delete one object. Returns false if it did not exist.
    pub async fn delete_object(&self, key: &str) -> StorageResult<bool> {
        self.ensure_key_safe(key)?;
        let result = sqlx::query("DELETE FROM objects WHERE bucket = ? AND key = ?")
            .bind(&self.bucket)
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }

        Ok(result.rows_affected() > 0)
    }

    /// Remove empty shard directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn upload(&self, path: &str, bytes: Bytes, options: &PutOptions) -> StorageResult<()> {
        self.put_object(path, &bytes, options).await.map(|_| ())
    }

    async fn download(&self, path: &str) -> StorageResult<Bytes> {
        self.get_object_metadata(path).await?;
        match fs::read(self.object_path(path)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(self.not_found(path)),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.ensure_key_safe(path)?;
        Ok(self.fetch_object(path).await?.is_some())
    }

    async fn remove(&self, paths: &[String]) -> StorageResult<usize> {
        let mut removed = 0;
        for path in paths {
            if self.delete_object(path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}{}public/{}/{}",
            self.public_base, OBJECT_MARKER, self.bucket, path
        )
    }

    /// Only URLs under this store's own public prefix map back to a key.
    fn path_from_public_url(&self, url: &str) -> Option<String> {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let path = url.strip_prefix(&self.public_url(""))?;
        if path.is_empty() {
            None
        } else {
            Some(path.to_string())
        }
    }
}

async fn write_durably(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Enforces S3-like naming rules so the bucket is a safe directory name and
/// URL segment: 3–63 chars of lowercase letters, digits, dots and hyphens,
/// starting and ending alphanumeric, no `..`, `-.` or `.-`.
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    async fn service() -> (StorageService, TempDir) {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let dir = TempDir::new().unwrap();
        let service = StorageService::new(
            Arc::new(pool),
            dir.path(),
            "portfolio-images",
            "http://localhost:3000/",
        )
        .unwrap();
        (service, dir)
    }

    #[test]
    fn bucket_names_are_validated() {
        for bad in ["ab", "Portfolio", "-images", "images.", "a..b", "a_b"] {
            assert!(ensure_bucket_name_safe(bad).is_err(), "{bad}");
        }
        assert!(ensure_bucket_name_safe("portfolio-images").is_ok());
    }

    #[tokio::test]
    async fn upload_download_round_trip() {
        let (store, _dir) = service().await;
        store
            .upload("photos/1-a.webp", Bytes::from_static(b"RIFF"), &PutOptions::webp())
            .await
            .unwrap();

        assert!(store.exists("photos/1-a.webp").await.unwrap());
        let bytes = store.download("photos/1-a.webp").await.unwrap();
        assert_eq!(&bytes[..], b"RIFF");

        let meta = store.get_object_metadata("photos/1-a.webp").await.unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("image/webp"));
        assert_eq!(meta.size_bytes, 4);
    }

    #[tokio::test]
    async fn upload_without_upsert_refuses_to_overwrite() {
        let (store, _dir) = service().await;
        let options = PutOptions::webp();
        store
            .upload("a.webp", Bytes::from_static(b"one"), &options)
            .await
            .unwrap();

        let err = store
            .upload("a.webp", Bytes::from_static(b"two"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ObjectAlreadyExists { .. }));

        store
            .upload("a.webp", Bytes::from_static(b"two"), &options.clone().upsert())
            .await
            .unwrap();
        assert_eq!(&store.download("a.webp").await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn remove_skips_missing_paths() {
        let (store, _dir) = service().await;
        store
            .upload("p/x.jpg", Bytes::from_static(b"x"), &PutOptions::immutable("image/jpeg"))
            .await
            .unwrap();

        let removed = store
            .remove(&["p/x.jpg".to_string(), "p/x-thumb.webp".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!store.exists("p/x.jpg").await.unwrap());
        assert!(matches!(
            store.download("p/x.jpg").await,
            Err(StorageError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (store, _dir) = service().await;
        for key in ["../etc/passwd", "/abs", "", "a\\b"] {
            let err = store
                .upload(key, Bytes::from_static(b"x"), &PutOptions::webp())
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectKey), "{key}");
        }
    }

    #[tokio::test]
    async fn public_urls_round_trip() {
        let (store, _dir) = service().await;
        let url = store.public_url("albums/1-a.webp");
        assert_eq!(
            url,
            "http://localhost:3000/storage/v1/object/public/portfolio-images/albums/1-a.webp"
        );
        assert_eq!(
            store.path_from_public_url(&format!("{url}?v=1")).as_deref(),
            Some("albums/1-a.webp")
        );
        assert_eq!(store.path_from_public_url("https://elsewhere.org/x.jpg"), None);
    }

    #[tokio::test]
    async fn foreign_urls_naming_the_bucket_are_not_ours() {
        let (store, _dir) = service().await;
        for url in [
            "https://images.example.org/portfolio-images/x.jpg",
            "https://cdn.example.com/storage/v1/object/public/portfolio-images/x.jpg",
            "http://localhost:3000/storage/v1/object/public/portfolio-images/",
        ] {
            assert_eq!(store.path_from_public_url(url), None, "{url}");
        }
    }

    #[tokio::test]
    async fn bucket_named_public_round_trips() {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let dir = TempDir::new().unwrap();
        let store =
            StorageService::new(Arc::new(pool), dir.path(), "public", "http://localhost:3000")
                .unwrap();

        let url = store.public_url("albums/1-a.webp");
        assert_eq!(
            url,
            "http://localhost:3000/storage/v1/object/public/public/albums/1-a.webp"
        );
        assert_eq!(
            store.path_from_public_url(&url).as_deref(),
            Some("albums/1-a.webp")
        );
    }
}
