//! Scenario tests for the upload pipeline against an in-memory object store
//! with write counting and failure injection.

use crate::imaging::ImageVariant;
use crate::services::object_store::{ObjectStore, PutOptions, StorageError, StorageResult};
use crate::services::upload::{SelectedFile, UploadError, UploadPipeline};
use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const BASE: &str = "https://media.test/storage/v1/object/public/portfolio-images/";

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, (Bytes, PutOptions)>>,
    writes: AtomicUsize,
    reject_webp: AtomicBool,
    reject_all: AtomicBool,
}

impl MemoryStore {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn get(&self, path: &str) -> Option<(Bytes, PutOptions)> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    fn paths(&self) -> Vec<String> {
        let mut paths = self.objects.lock().unwrap().keys().cloned().collect::<Vec<_>>();
        paths.sort();
        paths
    }

    fn forget(&self, path: &str) {
        self.objects.lock().unwrap().remove(path);
    }
}

fn refused() -> StorageError {
    StorageError::Io(std::io::Error::other("store refused the write"))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, path: &str, bytes: Bytes, options: &PutOptions) -> StorageResult<()> {
        if self.reject_all.load(Ordering::SeqCst)
            || (self.reject_webp.load(Ordering::SeqCst) && options.content_type == "image/webp")
        {
            return Err(refused());
        }
        let mut objects = self.objects.lock().unwrap();
        if !options.upsert && objects.contains_key(path) {
            return Err(StorageError::ObjectAlreadyExists {
                bucket: "portfolio-images".into(),
                key: path.into(),
            });
        }
        objects.insert(path.to_string(), (bytes, options.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download(&self, path: &str) -> StorageResult<Bytes> {
        self.get(path)
            .map(|(bytes, _)| bytes)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: "portfolio-images".into(),
                key: path.into(),
            })
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn remove(&self, paths: &[String]) -> StorageResult<usize> {
        let mut objects = self.objects.lock().unwrap();
        Ok(paths.iter().filter(|p| objects.remove(*p).is_some()).count())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}{}", BASE, path)
    }

    fn path_from_public_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(BASE).map(str::to_string)
    }
}

fn pipeline() -> (UploadPipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    (UploadPipeline::new(store.clone()), store)
}

fn jpeg(width: u32, height: u32) -> Bytes {
    let mut out = Vec::new();
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(out)
}

fn path_of(url: &str) -> String {
    url.strip_prefix(BASE).unwrap().to_string()
}

fn sibling(path: &str, suffix: &str) -> String {
    format!("{}-{}.webp", path.rsplit_once('.').unwrap().0, suffix)
}

#[tokio::test]
async fn upload_stores_webp_main_and_both_siblings() {
    let (pipeline, store) = pipeline();
    let file = SelectedFile::new("IMG_2041.JPG", jpeg(1600, 1200));

    let url = pipeline.upload(&file, "photos").await.unwrap();
    pipeline.settle().await;

    let path = path_of(&url);
    assert!(path.starts_with("photos/"), "{path}");
    assert!(path.ends_with(".webp"), "{path}");

    let (main, options) = store.get(&path).unwrap();
    assert_eq!(options.content_type, "image/webp");
    assert!(!options.upsert);
    assert_eq!(&main[8..12], b"WEBP");

    let thumb = store.get(&sibling(&path, "thumb")).unwrap().0;
    let decoded = image::load_from_memory(&thumb).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (900, 675));
    assert!(store.get(&sibling(&path, "display")).is_some());
    assert_eq!(store.writes(), 3);
}

#[tokio::test]
async fn corrupt_file_is_stored_byte_for_byte() {
    let (pipeline, store) = pipeline();
    let payload = Bytes::from_static(b"\xFF\xD8\xFF not really a jpeg");
    let file = SelectedFile::new("broken.jpg", payload.clone());

    let url = pipeline.upload(&file, "albums").await.unwrap();
    pipeline.settle().await;

    let path = path_of(&url);
    assert!(path.ends_with(".jpg"), "{path}");
    let (stored, options) = store.get(&path).unwrap();
    assert_eq!(stored, payload);
    assert_eq!(options.content_type, "image/jpeg");
    assert_eq!(store.paths(), vec![path], "no variants for undecodable input");
}

#[tokio::test]
async fn failed_main_write_falls_back_to_original() {
    let (pipeline, store) = pipeline();
    store.reject_webp.store(true, Ordering::SeqCst);
    let file = SelectedFile::new("shoot.jpeg", jpeg(640, 480));

    let url = pipeline.upload(&file, "photos").await.unwrap();
    pipeline.settle().await;

    let path = path_of(&url);
    assert!(path.ends_with(".jpeg"), "{path}");
    // Sibling writes were refused too; the upload still counts as done.
    assert_eq!(store.paths(), vec![path]);
}

#[tokio::test]
async fn fallback_upload_still_builds_variants() {
    let (pipeline, store) = pipeline();
    store.reject_webp.store(true, Ordering::SeqCst);
    let url = pipeline
        .upload(&SelectedFile::new("a.png", jpeg(320, 200)), "photos")
        .await
        .unwrap();
    pipeline.settle().await;
    store.reject_webp.store(false, Ordering::SeqCst);

    let written = pipeline.ensure_variants(&url).await.unwrap();
    assert_eq!(written.len(), 2);
    let path = path_of(&url);
    assert!(store.get(&sibling(&path, "thumb")).is_some());
    assert!(store.get(&sibling(&path, "display")).is_some());
}

#[tokio::test]
async fn canonical_write_failure_is_upload_failed() {
    let (pipeline, store) = pipeline();
    store.reject_all.store(true, Ordering::SeqCst);

    let err = pipeline
        .upload(&SelectedFile::new("a.jpg", jpeg(64, 64)), "photos")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UploadFailed { .. }), "{err:?}");
}

#[tokio::test]
async fn ensure_variants_is_idempotent() {
    let (pipeline, store) = pipeline();
    let url = pipeline
        .upload(&SelectedFile::new("a.jpg", jpeg(1000, 800)), "photos")
        .await
        .unwrap();
    pipeline.settle().await;
    let writes = store.writes();

    assert!(pipeline.ensure_variants(&url).await.unwrap().is_empty());
    assert!(pipeline.ensure_variants(&url).await.unwrap().is_empty());
    assert_eq!(store.writes(), writes);

    store.forget(&sibling(&path_of(&url), "thumb"));
    assert_eq!(
        pipeline.ensure_variants(&url).await.unwrap(),
        vec![ImageVariant::Thumb]
    );
    assert_eq!(store.writes(), writes + 1);
    assert!(pipeline.ensure_variants(&url).await.unwrap().is_empty());
    assert_eq!(store.writes(), writes + 1);
}

#[tokio::test]
async fn ensure_variants_rejects_foreign_urls() {
    let (pipeline, _store) = pipeline();
    let err = pipeline
        .ensure_variants("https://elsewhere.example/x.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::ForeignUrl(_)));
}

#[tokio::test]
async fn delete_image_removes_canonical_and_siblings() {
    let (pipeline, store) = pipeline();
    let url = pipeline
        .upload(&SelectedFile::new("a.jpg", jpeg(500, 500)), "photos")
        .await
        .unwrap();
    pipeline.settle().await;
    store.forget(&sibling(&path_of(&url), "display"));

    assert_eq!(pipeline.delete_image(&url).await.unwrap(), 2);
    assert!(store.paths().is_empty());

    assert_eq!(
        pipeline
            .delete_image("https://elsewhere.example/x.jpg")
            .await
            .unwrap(),
        0
    );
}
