//! Route table.
//!
//! ## Structure
//! - **Objects** (local object store)
//!   - `GET|HEAD /storage/v1/object/public/{bucket}/{*key}`: stored payload
//!   - `GET      /storage/v1/render/image/public/{bucket}/{*key}`: resized/re-encoded
//!
//! - **Public gallery API**
//!   - `GET /api/albums`
//!   - `GET /api/albums/{id}/photos?offset=&limit=`
//!   - `GET /api/portfolio?category=`
//!
//! - **Auth**: `POST /auth/sign-in`, `POST /auth/sign-out`
//!
//! - **Admin** (bearer session required): uploads, albums, photos, portfolio
//!
//! The wildcard `*key` allows nested keys like `photos/1700000000000-k3j9x.webp`.

use crate::{
    handlers::{
        admin_handlers as admin,
        auth_handlers::{require_session, sign_in, sign_out},
        gallery_handlers::{album_photos, list_albums, list_portfolio},
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object, render_image},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the full router. `state` is needed up front for the session gate.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/storage/v1/object/public/{bucket}/{*key}",
            get(get_object).head(head_object),
        )
        .route(
            "/storage/v1/render/image/public/{bucket}/{*key}",
            get(render_image),
        )
        .route("/api/albums", get(list_albums))
        .route("/api/albums/{id}/photos", get(album_photos))
        .route("/api/portfolio", get(list_portfolio))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .nest("/admin", admin_routes(state))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/uploads",
            post(admin::upload_image)
                .delete(admin::delete_image)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/uploads/variants", post(admin::ensure_variants))
        .route("/albums", post(admin::create_album))
        .route("/albums/reorder", post(admin::reorder_albums))
        .route(
            "/albums/{id}",
            put(admin::update_album).delete(admin::delete_album),
        )
        .route(
            "/albums/{id}/photos",
            get(admin::list_photos).post(admin::add_photo),
        )
        .route("/albums/{id}/photos/reorder", post(admin::reorder_photos))
        .route("/photos/{id}", delete(admin::delete_photo))
        .route("/portfolio", post(admin::create_portfolio_image))
        .route("/portfolio/reorder", post(admin::reorder_portfolio))
        .route(
            "/portfolio/{id}",
            put(admin::update_portfolio_image).delete(admin::delete_portfolio_image),
        )
        .route_layer(middleware::from_fn_with_state(state, require_session))
}
