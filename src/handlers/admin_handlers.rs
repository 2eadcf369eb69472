//! Admin API: image uploads and catalog maintenance. Mounted behind
//! [`require_session`](super::auth_handlers::require_session).
//!
//! Image fields take URLs; files are sent to `POST /admin/uploads` first and
//! the returned URL is used in the catalog request.

use crate::{
    errors::AppError,
    imaging::ImageVariant,
    models::{
        album::{Album, AlbumDraft, AlbumPhoto, PhotoDraft},
        portfolio::{PortfolioDraft, PortfolioImage},
    },
    services::{
        catalog::{Collection, ImageInput, PortfolioFields, ReorderReport},
        upload::SelectedFile,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub folder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UploadedImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub dragged_id: String,
    pub target_id: String,
}

/// `POST /admin/uploads?folder=` with a multipart `file` field.
pub async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedImage>), AppError> {
    let mut selected = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?;
        selected = Some(SelectedFile::new(name, bytes));
        break;
    }

    let file = selected.ok_or_else(|| AppError::bad_request("missing `file` field"))?;
    if file.bytes.is_empty() {
        return Err(AppError::bad_request("empty file"));
    }

    let folder = query.folder.as_deref().unwrap_or("");
    let url = state.uploads.upload(&file, folder).await?;
    Ok((StatusCode::CREATED, Json(UploadedImage { url })))
}

/// `DELETE /admin/uploads` with `{ "url": ... }`.
pub async fn delete_image(
    State(state): State<AppState>,
    Json(body): Json<ImageUrl>,
) -> Result<Json<Value>, AppError> {
    let removed = state.uploads.delete_image(&body.url).await?;
    info!("removed {} object(s) for {}", removed, body.url);
    Ok(Json(json!({ "removed": removed })))
}

/// `POST /admin/uploads/variants` with `{ "url": ... }`.
pub async fn ensure_variants(
    State(state): State<AppState>,
    Json(body): Json<ImageUrl>,
) -> Result<Json<Value>, AppError> {
    let written: Vec<ImageVariant> = state.uploads.ensure_variants(&body.url).await?;
    Ok(Json(json!({ "written": written })))
}

// --- Albums ---

pub async fn create_album(
    State(state): State<AppState>,
    Json(draft): Json<AlbumDraft>,
) -> Result<(StatusCode, Json<Album>), AppError> {
    let album = state
        .catalog
        .create_album(&draft.title, ImageInput::Url(draft.cover_image_url))
        .await?;
    Ok((StatusCode::CREATED, Json(album)))
}

pub async fn update_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<AlbumDraft>,
) -> Result<StatusCode, AppError> {
    state
        .catalog
        .update_album(&id, &draft.title, Some(ImageInput::Url(draft.cover_image_url)))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_album(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_albums(
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<ReorderReport>, AppError> {
    let report = state
        .catalog
        .reorder(&Collection::Albums, &body.dragged_id, &body.target_id)
        .await?;
    Ok(Json(report))
}

// --- Album photos ---

pub async fn list_photos(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
) -> Result<Json<Vec<AlbumPhoto>>, AppError> {
    Ok(Json(state.catalog.list_photos(&album_id).await?))
}

pub async fn add_photo(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Json(draft): Json<PhotoDraft>,
) -> Result<(StatusCode, Json<AlbumPhoto>), AppError> {
    let photo = state
        .catalog
        .add_photo(&album_id, ImageInput::Url(draft.photo_url))
        .await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_photo(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_photos(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<ReorderReport>, AppError> {
    let report = state
        .catalog
        .reorder(
            &Collection::Photos { album_id },
            &body.dragged_id,
            &body.target_id,
        )
        .await?;
    Ok(Json(report))
}

// --- Portfolio images ---

fn split_draft(draft: PortfolioDraft) -> (PortfolioFields, ImageInput) {
    (
        PortfolioFields {
            title: draft.title,
            description: draft.description.filter(|d| !d.trim().is_empty()),
            category: draft.category,
        },
        ImageInput::Url(draft.image_url),
    )
}

pub async fn create_portfolio_image(
    State(state): State<AppState>,
    Json(draft): Json<PortfolioDraft>,
) -> Result<(StatusCode, Json<PortfolioImage>), AppError> {
    let (fields, image) = split_draft(draft);
    let image = state.catalog.create_portfolio_image(fields, image).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

pub async fn update_portfolio_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<PortfolioDraft>,
) -> Result<StatusCode, AppError> {
    let (fields, image) = split_draft(draft);
    state
        .catalog
        .update_portfolio_image(&id, fields, Some(image))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_portfolio_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_portfolio_image(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_portfolio(
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<ReorderReport>, AppError> {
    let report = state
        .catalog
        .reorder(&Collection::Portfolio, &body.dragged_id, &body.target_id)
        .await?;
    Ok(Json(report))
}
