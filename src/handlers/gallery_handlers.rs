//! Public read API for the portfolio pages.
//!
//! Every image comes with the `<img>` attributes the page should start with,
//! computed from the process-wide transforms flag.

use crate::{
    errors::AppError,
    imaging::{AdaptiveImage, ImageOptions, ImageVariant, element::ImgAttributes},
    models::{
        album::{Album, AlbumPhoto},
        portfolio::{Category, PortfolioImage},
    },
    services::{
        pager::DESKTOP_PAGE_SIZE,
        row_store::{Direction, Select, Table, decode_records},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

/// Largest page a client may ask for.
const MAX_PAGE_SIZE: u64 = 100;
const GRID_SIZES: &str = "(max-width: 640px) 50vw, 33vw";

#[derive(Debug, Serialize)]
pub struct WithImage<T> {
    #[serde(flatten)]
    pub item: T,
    pub image: ImgAttributes,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PhotoPage {
    pub photos: Vec<WithImage<AlbumPhoto>>,
    pub offset: u64,
    pub total: Option<u64>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub category: Option<String>,
}

fn grid_image(state: &AppState, url: &str) -> ImgAttributes {
    let options = ImageOptions::default()
        .variant(ImageVariant::Thumb)
        .sizes(GRID_SIZES);
    AdaptiveImage::new(url, options, state.image_transforms).attributes()
}

fn display_image(state: &AppState, url: &str) -> ImgAttributes {
    let options = ImageOptions::default().variant(ImageVariant::Display);
    AdaptiveImage::new(url, options, state.image_transforms).attributes()
}

/// `GET /api/albums`
pub async fn list_albums(
    State(state): State<AppState>,
) -> Result<Json<Vec<WithImage<Album>>>, AppError> {
    let albums = state.catalog.list_albums().await?;
    let albums = albums
        .into_iter()
        .map(|album| WithImage {
            image: grid_image(&state, &album.cover_image_url),
            item: album,
        })
        .collect();
    Ok(Json(albums))
}

/// `GET /api/albums/{id}/photos?offset=&limit=`
///
/// One counted range of an album, in `order_index` order.
pub async fn album_photos(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<PhotoPage>, AppError> {
    let offset = page.offset.unwrap_or(0);
    let limit = page
        .limit
        .unwrap_or(DESKTOP_PAGE_SIZE as u64)
        .clamp(1, MAX_PAGE_SIZE);
    let last = offset
        .checked_add(limit - 1)
        .filter(|last| i64::try_from(*last).is_ok())
        .ok_or_else(|| AppError::bad_request(format!("offset {} is out of range", offset)))?;

    let query = Select::from(Table::AlbumPhotos)
        .eq("album_id", album_id.as_str())
        .order_by("order_index", Direction::Ascending)
        .range(offset, last)
        .with_count();
    let selection = state.rows.select(&query).await?;
    let photos = decode_records::<AlbumPhoto>(selection.rows)?;

    let loaded = offset + photos.len() as u64;
    let has_more = match selection.count {
        Some(total) => loaded < total,
        None => photos.len() as u64 == limit,
    };

    Ok(Json(PhotoPage {
        photos: photos
            .into_iter()
            .map(|photo| WithImage {
                image: grid_image(&state, &photo.photo_url),
                item: photo,
            })
            .collect(),
        offset,
        total: selection.count,
        has_more,
    }))
}

/// `GET /api/portfolio?category=`
pub async fn list_portfolio(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> Result<Json<Vec<WithImage<PortfolioImage>>>, AppError> {
    let category = query
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()
        .map_err(AppError::bad_request)?;

    let images = state.catalog.list_portfolio(category).await?;
    Ok(Json(
        images
            .into_iter()
            .map(|image| WithImage {
                image: display_image(&state, &image.image_url),
                item: image,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, db};
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn test_state(dir: &TempDir) -> AppState {
        let pool = Arc::new(db::connect_in_memory().await.unwrap());
        db::run_migrations(&pool).await.unwrap();
        let cfg = AppConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            storage_dir: dir.path().to_string_lossy().into_owned(),
            database_url: "sqlite::memory:".into(),
            public_url: "http://127.0.0.1:3000".into(),
            bucket: "portfolio-images".into(),
            image_transforms: false,
            admin_email: "admin@folio.test".into(),
            admin_password: "secret".into(),
        };
        AppState::new(pool, &cfg).unwrap()
    }

    fn page(offset: u64, limit: u64) -> Query<PageQuery> {
        Query(PageQuery {
            offset: Some(offset),
            limit: Some(limit),
        })
    }

    #[tokio::test]
    async fn offsets_past_the_row_range_are_rejected() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        for offset in [u64::MAX, i64::MAX as u64] {
            let err = album_photos(State(state.clone()), Path("a".into()), page(offset, 12))
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn empty_album_pages_report_no_more() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let Json(body) = album_photos(State(state), Path("a".into()), page(24, 12))
            .await
            .unwrap();
        assert!(body.photos.is_empty());
        assert_eq!(body.offset, 24);
        assert_eq!(body.total, Some(0));
        assert!(!body.has_more);
    }
}
