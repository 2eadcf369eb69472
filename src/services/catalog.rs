//! Admin-side catalog: albums, album photos and portfolio images.
//!
//! New rows are appended at `order_index = <current row count>`. Reordering
//! moves one element inside the ordered list and then rewrites the dense
//! index of every element with one concurrent update per row. The writes are
//! not transactional; a partial failure is reported, not rolled back.

use crate::models::album::{Album, AlbumPhoto};
use crate::models::portfolio::{Category, PortfolioImage};
use crate::services::row_store::{
    Direction, Record, RowStore, RowStoreError, Select, Table, decode_record, decode_records,
};
use crate::services::upload::{SelectedFile, UploadError, UploadPipeline};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Rows(#[from] RowStoreError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("no item `{0}` in this list")]
    UnknownItem(String),
    #[error("cannot move index {from} to {to} in a list of {len}")]
    MoveOutOfRange { from: usize, to: usize, len: usize },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Where an image field comes from: a freshly picked file or a URL typed in.
#[derive(Debug, Clone)]
pub enum ImageInput {
    File(SelectedFile),
    Url(String),
}

/// One ordered list of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    Albums,
    Photos { album_id: String },
    Portfolio,
}

impl Collection {
    fn table(&self) -> Table {
        match self {
            Collection::Albums => Table::Albums,
            Collection::Photos { .. } => Table::AlbumPhotos,
            Collection::Portfolio => Table::PortfolioImages,
        }
    }

    fn query(&self) -> Select {
        let query = Select::from(self.table()).order_by("order_index", Direction::Ascending);
        match self {
            Collection::Photos { album_id } => query.eq("album_id", album_id.as_str()),
            _ => query,
        }
    }

    fn upload_folder(&self) -> &'static str {
        match self {
            Collection::Albums => "albums",
            Collection::Photos { .. } => "photos",
            Collection::Portfolio => "portfolio",
        }
    }
}

/// Fields of a portfolio image besides the image itself.
#[derive(Debug, Clone)]
pub struct PortfolioFields {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
}

/// Outcome of persisting a new order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReorderReport {
    pub updated: usize,
    /// Ids whose `order_index` write failed; their stored index is stale.
    pub failed: Vec<String>,
}

impl ReorderReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Move the element at `from` so that it ends up at `to`, shifting the
/// elements in between.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> CatalogResult<()> {
    let len = items.len();
    if from >= len || to >= len {
        return Err(CatalogError::MoveOutOfRange { from, to, len });
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

pub struct Catalog {
    rows: Arc<dyn RowStore>,
    uploads: Arc<UploadPipeline>,
}

impl Catalog {
    pub fn new(rows: Arc<dyn RowStore>, uploads: Arc<UploadPipeline>) -> Self {
        Self { rows, uploads }
    }

    pub fn uploads(&self) -> &Arc<UploadPipeline> {
        &self.uploads
    }

    // --- Albums ---

    pub async fn list_albums(&self) -> CatalogResult<Vec<Album>> {
        let selection = self.rows.select(&Collection::Albums.query()).await?;
        Ok(decode_records(selection.rows)?)
    }

    pub async fn create_album(&self, title: &str, cover: ImageInput) -> CatalogResult<Album> {
        let title = non_empty("title", title)?;
        let collection = Collection::Albums;
        let cover_image_url = self.resolve_image(cover, &collection).await?;
        let order_index = self.count(&collection).await?;

        let mut row = Record::new();
        row.insert("title".into(), title.into());
        row.insert("cover_image_url".into(), cover_image_url.into());
        row.insert("order_index".into(), order_index.into());
        let album: Album = decode_record(self.rows.insert(Table::Albums, row).await?)?;
        info!("created album {} ({})", album.id, album.title);
        Ok(album)
    }

    /// Rename an album; a new cover replaces the old one when given.
    pub async fn update_album(
        &self,
        id: &str,
        title: &str,
        cover: Option<ImageInput>,
    ) -> CatalogResult<()> {
        let mut changes = Record::new();
        changes.insert("title".into(), non_empty("title", title)?.into());
        if let Some(cover) = cover {
            let url = self.resolve_image(cover, &Collection::Albums).await?;
            changes.insert("cover_image_url".into(), url.into());
        }
        self.rows.update(Table::Albums, id, changes).await?;
        Ok(())
    }

    /// Delete an album; its photos go with it.
    pub async fn delete_album(&self, id: &str) -> CatalogResult<()> {
        self.rows.delete(Table::Albums, id).await?;
        info!("deleted album {}", id);
        Ok(())
    }

    // --- Album photos ---

    pub async fn list_photos(&self, album_id: &str) -> CatalogResult<Vec<AlbumPhoto>> {
        let collection = Collection::Photos {
            album_id: album_id.to_string(),
        };
        let selection = self.rows.select(&collection.query()).await?;
        Ok(decode_records(selection.rows)?)
    }

    pub async fn add_photo(&self, album_id: &str, image: ImageInput) -> CatalogResult<AlbumPhoto> {
        let collection = Collection::Photos {
            album_id: album_id.to_string(),
        };
        let photo_url = self.resolve_image(image, &collection).await?;
        let order_index = self.count(&collection).await?;

        let mut row = Record::new();
        row.insert("album_id".into(), album_id.into());
        row.insert("photo_url".into(), photo_url.into());
        row.insert("order_index".into(), order_index.into());
        Ok(decode_record(self.rows.insert(Table::AlbumPhotos, row).await?)?)
    }

    pub async fn delete_photo(&self, id: &str) -> CatalogResult<()> {
        self.rows.delete(Table::AlbumPhotos, id).await?;
        Ok(())
    }

    // --- Portfolio images ---

    /// Portfolio images in display order, optionally limited to one section.
    pub async fn list_portfolio(
        &self,
        category: Option<Category>,
    ) -> CatalogResult<Vec<PortfolioImage>> {
        let mut query = Collection::Portfolio.query();
        if let Some(category) = category {
            query = query.eq("category", category.as_str());
        }
        let selection = self.rows.select(&query).await?;
        Ok(decode_records(selection.rows)?)
    }

    pub async fn create_portfolio_image(
        &self,
        fields: PortfolioFields,
        image: ImageInput,
    ) -> CatalogResult<PortfolioImage> {
        let collection = Collection::Portfolio;
        let mut row = portfolio_record(&fields)?;
        let image_url = self.resolve_image(image, &collection).await?;
        row.insert("image_url".into(), image_url.into());
        row.insert("order_index".into(), self.count(&collection).await?.into());

        let image: PortfolioImage =
            decode_record(self.rows.insert(Table::PortfolioImages, row).await?)?;
        info!("created portfolio image {} in {}", image.id, image.category);
        Ok(image)
    }

    pub async fn update_portfolio_image(
        &self,
        id: &str,
        fields: PortfolioFields,
        image: Option<ImageInput>,
    ) -> CatalogResult<()> {
        let mut changes = portfolio_record(&fields)?;
        if fields.description.is_none() {
            changes.insert("description".into(), Value::Null);
        }
        if let Some(image) = image {
            let url = self.resolve_image(image, &Collection::Portfolio).await?;
            changes.insert("image_url".into(), url.into());
        }
        self.rows.update(Table::PortfolioImages, id, changes).await?;
        Ok(())
    }

    pub async fn delete_portfolio_image(&self, id: &str) -> CatalogResult<()> {
        self.rows.delete(Table::PortfolioImages, id).await?;
        Ok(())
    }

    // --- Ordering ---

    /// Drop `dragged_id` onto the position of `target_id` and persist the new
    /// order. Dropping an item onto itself changes nothing.
    pub async fn reorder(
        &self,
        collection: &Collection,
        dragged_id: &str,
        target_id: &str,
    ) -> CatalogResult<ReorderReport> {
        if dragged_id == target_id {
            return Ok(ReorderReport::default());
        }

        let selection = self.rows.select(&collection.query()).await?;
        let mut ids = selection
            .rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
            .collect::<Vec<_>>();

        let position = |id: &str, ids: &[String]| {
            ids.iter()
                .position(|candidate| candidate == id)
                .ok_or_else(|| CatalogError::UnknownItem(id.to_string()))
        };
        let from = position(dragged_id, &ids)?;
        let to = position(target_id, &ids)?;
        move_item(&mut ids, from, to)?;

        Ok(self.persist_order(collection, &ids).await)
    }

    /// Write `order_index = position` for every id, concurrently.
    pub async fn persist_order(&self, collection: &Collection, ids: &[String]) -> ReorderReport {
        let table = collection.table();
        let updates = ids.iter().enumerate().map(|(index, id)| async move {
            let mut changes = Record::new();
            changes.insert("order_index".into(), (index as i64).into());
            match self.rows.update(table, id, changes).await {
                Ok(()) => None,
                Err(err) => {
                    warn!("order update for {} in {} failed: {}", id, table, err);
                    Some(id.clone())
                }
            }
        });

        let failed = join_all(updates)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        ReorderReport {
            updated: ids.len() - failed.len(),
            failed,
        }
    }

    async fn resolve_image(
        &self,
        input: ImageInput,
        collection: &Collection,
    ) -> CatalogResult<String> {
        match input {
            ImageInput::Url(url) => Ok(non_empty("image url", &url)?.to_string()),
            ImageInput::File(file) => Ok(self
                .uploads
                .upload(&file, collection.upload_folder())
                .await?),
        }
    }

    async fn count(&self, collection: &Collection) -> CatalogResult<i64> {
        let selection = self
            .rows
            .select(&collection.query().range(0, 0).with_count())
            .await?;
        match selection.count {
            Some(count) => Ok(count as i64),
            None => {
                let all = self.rows.select(&collection.query()).await?;
                Ok(all.rows.len() as i64)
            }
        }
    }
}

fn non_empty<'a>(field: &'static str, value: &'a str) -> CatalogResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CatalogError::EmptyField(field))
    } else {
        Ok(trimmed)
    }
}

fn portfolio_record(fields: &PortfolioFields) -> CatalogResult<Record> {
    let mut row = Record::new();
    row.insert("title".into(), non_empty("title", &fields.title)?.into());
    if let Some(description) = &fields.description {
        row.insert("description".into(), description.as_str().into());
    }
    row.insert("category".into(), fields.category.as_str().into());
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_item_shifts_the_elements_between() {
        let mut items = vec!["a", "b", "c", "d"];
        move_item(&mut items, 0, 2).unwrap();
        assert_eq!(items, ["b", "c", "a", "d"]);
        move_item(&mut items, 3, 0).unwrap();
        assert_eq!(items, ["d", "b", "c", "a"]);
        move_item(&mut items, 1, 1).unwrap();
        assert_eq!(items, ["d", "b", "c", "a"]);
    }

    #[test]
    fn move_item_rejects_out_of_range() {
        let mut items = vec![1, 2];
        assert!(matches!(
            move_item(&mut items, 0, 2),
            Err(CatalogError::MoveOutOfRange { len: 2, .. })
        ));
        assert_eq!(items, [1, 2]);
    }
}
