//! Albums and the photos they own.

use serde::{Deserialize, Serialize};

/// A photo album shown on the collections page.
///
/// `order_index` is dense and zero-based across all albums; reordering
/// rewrites it for every affected album.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub cover_image_url: String,
    pub order_index: i64,
}

/// A photo inside an album, ordered by `order_index` within the album.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AlbumPhoto {
    pub id: String,
    pub album_id: String,
    pub photo_url: String,
    pub order_index: i64,
}

/// Fields accepted when creating or editing an album.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AlbumDraft {
    pub title: String,
    pub cover_image_url: String,
}

/// Body of an "add photo" request; the photo is referenced by URL.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PhotoDraft {
    pub photo_url: String,
}
