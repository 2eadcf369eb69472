//! HTTP handlers for public object reads and the on-the-fly render endpoint.
//! Object bodies are streamed from disk; rendered images are produced on a
//! blocking worker.

use crate::{
    errors::AppError,
    imaging::{
        render::{self, RenderRequest},
        url::{OutputFormat, ResizeMode},
    },
    models::object::StoredObject,
    services::object_store::{LONG_LIVED_CACHE, ObjectStore},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tokio::task;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Query parameters of the render endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub resize: Option<ResizeMode>,
    pub format: Option<OutputFormat>,
}

impl From<RenderQuery> for RenderRequest {
    fn from(query: RenderQuery) -> Self {
        RenderRequest {
            width: query.width,
            height: query.height,
            quality: query.quality,
            resize: query.resize,
            format: query.format,
        }
    }
}

fn ensure_bucket(state: &AppState, bucket: &str, key: &str) -> Result<(), AppError> {
    if bucket == state.storage.bucket {
        Ok(())
    } else {
        Err(AppError::not_found(format!(
            "object `{}` not found in bucket `{}`",
            key, bucket
        )))
    }
}

/// `GET /storage/v1/object/public/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    ensure_bucket(&state, &bucket, &key)?;
    let (meta, file) = state.storage.get_object_reader(&key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// `HEAD /storage/v1/object/public/{bucket}/{*key}`
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    ensure_bucket(&state, &bucket, &key)?;
    let meta = state.storage.get_object_metadata(&key).await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// `GET /storage/v1/render/image/public/{bucket}/{*key}`
///
/// Responds 422 when the stored object cannot be decoded or re-encoded, so
/// the client falls back to a variant or the original.
pub async fn render_image(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, AppError> {
    ensure_bucket(&state, &bucket, &key)?;
    let bytes = state.storage.download(&key).await?;
    let request = RenderRequest::from(query);
    debug!("rendering {} with {:?}", key, request);

    let rendered = task::spawn_blocking(move || render::render(&bytes, &request))
        .await
        .map_err(|err| AppError::internal(format!("render task failed: {}", err)))??;

    let mut response = Response::new(Body::from(rendered.bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(rendered.content_type),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(LONG_LIVED_CACHE),
    );
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes.max(0)));

    if let Some(cache_control) = meta.cache_control.as_deref() {
        if let Ok(value) = HeaderValue::from_str(cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }

    if let Some(etag) = meta.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
