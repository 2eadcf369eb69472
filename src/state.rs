//! Shared state handed to every handler.

use crate::config::AppConfig;
use crate::services::{
    catalog::Catalog,
    object_store::StorageResult,
    row_store::{RowStore, SqliteRowStore},
    session::{ConfiguredAdmin, SessionService},
    storage_service::StorageService,
    upload::UploadPipeline,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageService>,
    pub rows: Arc<dyn RowStore>,
    pub uploads: Arc<UploadPipeline>,
    pub catalog: Arc<Catalog>,
    pub sessions: Arc<SessionService>,
    pub image_transforms: bool,
}

impl AppState {
    /// Wire the local backends together. The session service is started.
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> StorageResult<Self> {
        let storage = Arc::new(StorageService::new(
            db.clone(),
            &cfg.storage_dir,
            cfg.bucket.clone(),
            cfg.public_url.clone(),
        )?);
        let rows: Arc<dyn RowStore> = Arc::new(SqliteRowStore::new(db));
        let uploads = Arc::new(UploadPipeline::new(storage.clone()));
        let catalog = Arc::new(Catalog::new(rows.clone(), uploads.clone()));

        let sessions = Arc::new(SessionService::new(Arc::new(ConfiguredAdmin::new(
            cfg.admin_email.clone(),
            cfg.admin_password.clone(),
        ))));
        sessions.init();

        Ok(Self {
            storage,
            rows,
            uploads,
            catalog,
            sessions,
            image_transforms: cfg.image_transforms,
        })
    }
}
