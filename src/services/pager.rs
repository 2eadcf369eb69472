//! Album pager: loads an album's photos in pages ordered by `order_index`.
//!
//! The loaded photos are always a gap-free, duplicate-free prefix of the
//! album. Every fetch is stamped with the album and a load generation taken at
//! call time; a response that comes back after the album changed, or after a
//! newer first-page load started, is dropped without touching state.

use crate::models::album::AlbumPhoto;
use crate::services::row_store::{
    Direction, RowStore, RowStoreError, Select, Table, decode_records,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const DESKTOP_PAGE_SIZE: usize = 12;
pub const MOBILE_PAGE_SIZE: usize = 6;
/// Viewports at most this wide get the small page size.
pub const MOBILE_MAX_WIDTH: u32 = 640;

pub fn page_size_for_viewport(width: u32) -> usize {
    if width <= MOBILE_MAX_WIDTH {
        MOBILE_PAGE_SIZE
    } else {
        DESKTOP_PAGE_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerPhase {
    Idle,
    LoadingFirst,
    Ready,
    LoadingMore,
    Exhausted,
}

/// What a load call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// Rows appended (or loaded, for the first page).
    Loaded(usize),
    /// Nothing fetched: no album, already loading, or nothing more to load.
    Skipped,
    /// The response arrived for a superseded request and was discarded.
    Stale,
    /// The store failed; treated as the end of the album.
    Failed,
}

/// Read-only copy of the pager state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerSnapshot {
    pub album_id: Option<String>,
    pub page_size: usize,
    pub photos: Vec<AlbumPhoto>,
    pub total_count: Option<u64>,
    pub has_more: bool,
    pub is_loading_first: bool,
    pub is_loading_more: bool,
}

#[derive(Debug, Default)]
struct PagerState {
    album_id: Option<String>,
    generation: u64,
    page_size: usize,
    photos: Vec<AlbumPhoto>,
    total_count: Option<u64>,
    has_more: bool,
    loading_first: bool,
    loading_more: bool,
    loaded: bool,
}

impl PagerState {
    fn reset(&mut self) {
        self.generation += 1;
        self.photos.clear();
        self.total_count = None;
        self.has_more = false;
        self.loading_first = false;
        self.loading_more = false;
        self.loaded = false;
    }

    fn is_current(&self, album_id: &str, generation: u64) -> bool {
        self.generation == generation && self.album_id.as_deref() == Some(album_id)
    }
}

pub struct AlbumPager {
    rows: Arc<dyn RowStore>,
    state: Mutex<PagerState>,
}

impl AlbumPager {
    pub fn new(rows: Arc<dyn RowStore>, page_size: usize) -> Self {
        Self {
            rows,
            state: Mutex::new(PagerState {
                page_size: page_size.max(1),
                ..PagerState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point the pager at another album, dropping everything loaded so far.
    /// In-flight fetches for the previous album become stale.
    pub fn switch_album(&self, album_id: impl Into<String>) {
        let album_id = album_id.into();
        let mut state = self.state();
        if state.album_id.as_deref() != Some(album_id.as_str()) {
            debug!("pager switching to album {}", album_id);
        }
        state.reset();
        state.album_id = Some(album_id);
    }

    /// Switch to `album_id` and load its first page.
    pub async fn open(&self, album_id: impl Into<String>) -> PageLoad {
        self.switch_album(album_id);
        self.load_first_page().await
    }

    /// Forget the album; pending responses will be discarded.
    pub fn close(&self) {
        let mut state = self.state();
        state.reset();
        state.album_id = None;
    }

    /// Page size for the next fetch. Already loaded pages are left as they are.
    pub fn set_page_size(&self, page_size: usize) {
        self.state().page_size = page_size.max(1);
    }

    pub fn set_viewport_width(&self, width: u32) {
        self.set_page_size(page_size_for_viewport(width));
    }

    /// Reset and fetch rows `0..page_size` with an exact count.
    pub async fn load_first_page(&self) -> PageLoad {
        let (album_id, generation, page_size) = {
            let mut state = self.state();
            let Some(album_id) = state.album_id.clone() else {
                return PageLoad::Skipped;
            };
            state.reset();
            state.loading_first = true;
            (album_id, state.generation, state.page_size)
        };

        let query = photos_query(&album_id)
            .range(0, page_size as u64 - 1)
            .with_count();
        let result = self.fetch(&query).await;

        let mut state = self.state();
        if !state.is_current(&album_id, generation) {
            debug!("discarding stale first page of album {}", album_id);
            return PageLoad::Stale;
        }

        state.loading_first = false;
        state.loaded = true;
        match result {
            Ok((photos, count)) => {
                let loaded = photos.len();
                state.photos = photos;
                state.total_count = count;
                state.has_more = match count {
                    Some(total) => (loaded as u64) < total,
                    None => loaded == page_size,
                };
                PageLoad::Loaded(loaded)
            }
            Err(err) => {
                warn!("first page of album {} failed: {}", album_id, err);
                state.has_more = false;
                PageLoad::Failed
            }
        }
    }

    /// Append the next page. No-op while loading or when nothing is left.
    pub async fn load_more(&self) -> PageLoad {
        let (album_id, generation, page_size, offset) = {
            let mut state = self.state();
            if state.loading_first || state.loading_more || !state.has_more {
                return PageLoad::Skipped;
            }
            let Some(album_id) = state.album_id.clone() else {
                return PageLoad::Skipped;
            };
            state.loading_more = true;
            (album_id, state.generation, state.page_size, state.photos.len())
        };

        let from = offset as u64;
        let query = photos_query(&album_id).range(from, from + page_size as u64 - 1);
        let result = self.fetch(&query).await;

        let mut state = self.state();
        if !state.is_current(&album_id, generation) {
            debug!("discarding stale page at {} of album {}", offset, album_id);
            return PageLoad::Stale;
        }

        state.loading_more = false;
        match result {
            Ok((photos, _)) if !photos.is_empty() => {
                let full_page = photos.len() == page_size;
                let seen = state
                    .photos
                    .iter()
                    .map(|p| p.id.clone())
                    .collect::<HashSet<_>>();
                let fresh = photos
                    .into_iter()
                    .filter(|p| !seen.contains(&p.id))
                    .collect::<Vec<_>>();
                let appended = fresh.len();
                state.photos.extend(fresh);

                let below_total = state
                    .total_count
                    .is_none_or(|total| (state.photos.len() as u64) < total);
                state.has_more = full_page && below_total;
                PageLoad::Loaded(appended)
            }
            Ok(_) => {
                state.has_more = false;
                PageLoad::Loaded(0)
            }
            Err(err) => {
                warn!("next page of album {} failed: {}", album_id, err);
                state.has_more = false;
                PageLoad::Failed
            }
        }
    }

    async fn fetch(&self, query: &Select) -> Result<(Vec<AlbumPhoto>, Option<u64>), RowStoreError> {
        let selection = self.rows.select(query).await?;
        let photos = decode_records::<AlbumPhoto>(selection.rows)?;
        Ok((photos, selection.count))
    }

    pub fn snapshot(&self) -> PagerSnapshot {
        let state = self.state();
        PagerSnapshot {
            album_id: state.album_id.clone(),
            page_size: state.page_size,
            photos: state.photos.clone(),
            total_count: state.total_count,
            has_more: state.has_more,
            is_loading_first: state.loading_first,
            is_loading_more: state.loading_more,
        }
    }

    pub fn phase(&self) -> PagerPhase {
        let state = self.state();
        if state.loading_first {
            PagerPhase::LoadingFirst
        } else if state.loading_more {
            PagerPhase::LoadingMore
        } else if !state.loaded {
            PagerPhase::Idle
        } else if state.has_more {
            PagerPhase::Ready
        } else {
            PagerPhase::Exhausted
        }
    }

    /// Changes whenever the loaded set is thrown away.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn len(&self) -> usize {
        self.state().photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn photo(&self, index: usize) -> Option<AlbumPhoto> {
        self.state().photos.get(index).cloned()
    }

    pub fn has_more(&self) -> bool {
        self.state().has_more
    }

    pub fn is_loading_more(&self) -> bool {
        self.state().loading_more
    }

    pub fn total_count(&self) -> Option<u64> {
        self.state().total_count
    }
}

fn photos_query(album_id: &str) -> Select {
    Select::from(Table::AlbumPhotos)
        .eq("album_id", album_id)
        .order_by("order_index", Direction::Ascending)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_follows_viewport_class() {
        assert_eq!(page_size_for_viewport(375), MOBILE_PAGE_SIZE);
        assert_eq!(page_size_for_viewport(640), MOBILE_PAGE_SIZE);
        assert_eq!(page_size_for_viewport(641), DESKTOP_PAGE_SIZE);
        assert_eq!(page_size_for_viewport(1920), DESKTOP_PAGE_SIZE);
    }
}
