//! Upload pipeline: turn a selected file into a canonical stored object plus
//! best-effort `-thumb`/`-display` siblings.
//!
//! Only a failed canonical write is an error. Encoding problems fall back to
//! storing the original bytes, and sibling writes run as detached tasks whose
//! failures are logged and dropped.

use crate::imaging::encoder::{self, EncodedImage, ImageVariant, ImagingError, file_extension};
use crate::imaging::url::variant_path;
use crate::services::object_store::{
    ObjectStore, PutOptions, StorageError, content_type_for_extension,
};
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_FOLDER: &str = "images";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of `{path}` failed: {source}")]
    UploadFailed {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("could not read `{path}`: {source}")]
    FetchFailed {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("could not delete `{path}`: {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error("`{0}` is not an object in this store")]
    ForeignUrl(String),
}

/// A file picked by the admin, fully read into memory.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

pub struct UploadPipeline {
    store: Arc<dyn ObjectStore>,
    side_writes: Mutex<JoinSet<()>>,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            side_writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Store `file` under `<folder>/<timestamp>-<random>` and return its public URL.
    ///
    /// Tries the WebP encodings first and falls back to the untouched original.
    /// Returns `UploadFailed` only when the canonical object could not be written.
    pub async fn upload(&self, file: &SelectedFile, folder: &str) -> Result<String, UploadError> {
        let base = object_base_name(folder);

        match self.upload_encoded(file, &base).await {
            Ok(url) => return Ok(url),
            Err(err) => warn!(
                "optimized upload of {} failed, storing original instead: {}",
                file.name, err
            ),
        }

        self.upload_original(file, &base).await
    }

    async fn upload_encoded(&self, file: &SelectedFile, base: &str) -> Result<String, UploadError> {
        let encoded = encode_blocking(
            file.bytes.clone(),
            Some(file.name.clone()),
            ImageVariant::ALL.to_vec(),
        )
        .await?;

        let (main, siblings): (Vec<_>, Vec<_>) = encoded
            .into_iter()
            .partition(|image| image.variant == ImageVariant::Main);
        let main = main
            .into_iter()
            .next()
            .ok_or_else(|| ImagingError::EncodingFailed("no main encoding produced".into()))?;

        let path = format!("{}.webp", base);
        self.store
            .upload(&path, Bytes::from(main.bytes), &PutOptions::webp())
            .await
            .map_err(|source| UploadError::UploadFailed {
                path: path.clone(),
                source,
            })?;
        info!("uploaded {} as {} ({}x{})", file.name, path, main.width, main.height);

        let store = self.store.clone();
        let canonical = path.clone();
        self.spawn_side_write(async move {
            write_siblings(store.as_ref(), &canonical, siblings).await;
        });

        Ok(self.store.public_url(&path))
    }

    async fn upload_original(&self, file: &SelectedFile, base: &str) -> Result<String, UploadError> {
        let extension = file_extension(&file.name).unwrap_or_else(|| "bin".into());
        let path = format!("{}.{}", base, extension);
        let options = PutOptions::immutable(content_type_for_extension(&extension));

        self.store
            .upload(&path, file.bytes.clone(), &options)
            .await
            .map_err(|source| UploadError::UploadFailed {
                path: path.clone(),
                source,
            })?;
        info!("uploaded original {} as {}", file.name, path);

        let store = self.store.clone();
        let bytes = file.bytes.clone();
        let name = file.name.clone();
        let canonical = path.clone();
        self.spawn_side_write(async move {
            match encode_blocking(bytes, Some(name), ImageVariant::SIBLINGS.to_vec()).await {
                Ok(images) => {
                    write_siblings(store.as_ref(), &canonical, images).await;
                }
                Err(err) => debug!("no variants for {}: {}", canonical, err),
            }
        });

        Ok(self.store.public_url(&path))
    }

    /// Create whichever of the `-thumb`/`-display` siblings of `public_url` are
    /// missing. Returns the variants written; empty when both already exist.
    pub async fn ensure_variants(&self, public_url: &str) -> Result<Vec<ImageVariant>, UploadError> {
        let path = self
            .store
            .path_from_public_url(public_url)
            .ok_or_else(|| UploadError::ForeignUrl(public_url.to_string()))?;

        let mut missing = Vec::new();
        for variant in ImageVariant::SIBLINGS {
            let Some(sibling) = sibling_path(&path, variant) else {
                continue;
            };
            let exists = self
                .store
                .exists(&sibling)
                .await
                .map_err(|source| UploadError::FetchFailed {
                    path: sibling.clone(),
                    source,
                })?;
            if !exists {
                missing.push(variant);
            }
        }

        if missing.is_empty() {
            debug!("variants of {} already present", path);
            return Ok(Vec::new());
        }

        let original = self
            .store
            .download(&path)
            .await
            .map_err(|source| UploadError::FetchFailed {
                path: path.clone(),
                source,
            })?;
        let images = encode_blocking(original, Some(path.clone()), missing).await?;
        Ok(write_siblings(self.store.as_ref(), &path, images).await)
    }

    /// Remove the canonical object and both siblings in one batch.
    ///
    /// URLs that do not point into this store are ignored. Returns the number
    /// of objects removed.
    pub async fn delete_image(&self, public_url: &str) -> Result<usize, UploadError> {
        let Some(path) = self.store.path_from_public_url(public_url) else {
            debug!("not deleting foreign url {}", public_url);
            return Ok(0);
        };

        let mut paths = vec![path.clone()];
        paths.extend(
            ImageVariant::SIBLINGS
                .iter()
                .filter_map(|variant| sibling_path(&path, *variant)),
        );

        self.store
            .remove(&paths)
            .await
            .map_err(|source| UploadError::DeleteFailed { path, source })
    }

    /// Wait for every pending sibling write. Failures were already logged.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(
            &mut *self
                .side_writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(result) = pending.join_next().await {
            if let Err(err) = result {
                warn!("variant task did not finish: {}", err);
            }
        }
    }

    fn spawn_side_write<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self
            .side_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Reap finished tasks so the set only holds in-flight work.
        while set.try_join_next().is_some() {}
        set.spawn(write);
    }
}

fn sibling_path(canonical: &str, variant: ImageVariant) -> Option<String> {
    variant_path(canonical, variant.suffix()?)
}

/// `<folder>/<unix millis>-<7 random chars>`, without extension.
fn object_base_name(folder: &str) -> String {
    let folder = folder.trim_matches('/');
    let folder = if folder.is_empty() { DEFAULT_FOLDER } else { folder };
    let random = Uuid::new_v4().simple().to_string();
    format!("{}/{}-{}", folder, Utc::now().timestamp_millis(), &random[..7])
}

async fn encode_blocking(
    bytes: Bytes,
    file_name: Option<String>,
    wanted: Vec<ImageVariant>,
) -> Result<Vec<EncodedImage>, ImagingError> {
    task::spawn_blocking(move || encoder::encode_variants(&bytes, file_name.as_deref(), &wanted))
        .await
        .map_err(|err| ImagingError::EncodingFailed(format!("encoder task failed: {}", err)))?
}

/// Write sibling encodings next to `canonical`, each independently. Returns
/// the variants that were stored.
async fn write_siblings(
    store: &dyn ObjectStore,
    canonical: &str,
    images: Vec<EncodedImage>,
) -> Vec<ImageVariant> {
    let writes = images.into_iter().filter_map(|image| {
        let path = sibling_path(canonical, image.variant)?;
        Some(async move {
            let options = PutOptions::webp().upsert();
            match store.upload(&path, Bytes::from(image.bytes), &options).await {
                Ok(()) => {
                    debug!("stored {:?} variant {}", image.variant, path);
                    Some(image.variant)
                }
                Err(err) => {
                    warn!("variant write failed for {}: {}", path, err);
                    None
                }
            }
        })
    });

    join_all(writes).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_names_follow_folder_timestamp_random() {
        let name = object_base_name("/albums/");
        let (folder, file) = name.split_once('/').unwrap();
        assert_eq!(folder, "albums");
        let (millis, random) = file.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(random.len(), 7);

        assert!(object_base_name("").starts_with("images/"));
    }

    #[test]
    fn sibling_paths_share_the_base_name() {
        assert_eq!(
            sibling_path("photos/1-a.jpg", ImageVariant::Thumb).as_deref(),
            Some("photos/1-a-thumb.webp")
        );
        assert_eq!(sibling_path("photos/1-a.webp", ImageVariant::Main), None);
    }
}
