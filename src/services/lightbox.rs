//! Full-screen viewer cursor over the photos an [`AlbumPager`] has loaded.

use crate::models::album::AlbumPhoto;
use crate::services::pager::{AlbumPager, PageLoad};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Escape,
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowLeft" => Key::ArrowLeft,
            "ArrowRight" => Key::ArrowRight,
            "Escape" | "Esc" => Key::Escape,
            _ => Key::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    /// At the last loaded photo; another page was requested. The cursor stays.
    RequestedMore(PageLoad),
    /// At an edge with nothing further to show.
    Stayed,
    Closed,
    /// The viewer is closed, or the key is not bound.
    Ignored,
}

/// `None` while closed. The cursor is tied to the pager generation it was
/// opened against; when the pager drops its photos the viewer reads as closed.
#[derive(Debug, Default)]
pub struct Lightbox {
    cursor: Option<(usize, u64)>,
}

impl Lightbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open at `index` of the loaded photos. Out-of-range indices leave the
    /// viewer closed.
    pub fn open(&mut self, index: usize, pager: &AlbumPager) -> bool {
        if index >= pager.len() {
            debug!("lightbox index {} outside {} loaded photos", index, pager.len());
            self.cursor = None;
            return false;
        }
        self.cursor = Some((index, pager.generation()));
        true
    }

    pub fn close(&mut self) {
        self.cursor = None;
    }

    pub fn cursor(&self, pager: &AlbumPager) -> Option<usize> {
        match self.cursor {
            Some((index, generation)) if generation == pager.generation() => Some(index),
            _ => None,
        }
    }

    pub fn is_open(&self, pager: &AlbumPager) -> bool {
        self.cursor(pager).is_some()
    }

    pub fn current(&self, pager: &AlbumPager) -> Option<AlbumPhoto> {
        pager.photo(self.cursor(pager)?)
    }

    /// Advance one photo. At the end of the loaded set this asks the pager for
    /// the next page but does not move; the caller advances again once the
    /// page is in.
    pub async fn next(&mut self, pager: &AlbumPager) -> Navigation {
        let Some(index) = self.sync(pager) else {
            return Navigation::Ignored;
        };

        if index + 1 < pager.len() {
            self.move_to(index + 1, pager)
        } else if pager.has_more() && !pager.is_loading_more() {
            Navigation::RequestedMore(pager.load_more().await)
        } else {
            Navigation::Stayed
        }
    }

    /// Step back one photo. No wraparound.
    pub fn previous(&mut self, pager: &AlbumPager) -> Navigation {
        match self.sync(pager) {
            None => Navigation::Ignored,
            Some(0) => Navigation::Stayed,
            Some(index) => self.move_to(index - 1, pager),
        }
    }

    /// Keys only act while the viewer is open.
    pub async fn handle_key(&mut self, key: Key, pager: &AlbumPager) -> Navigation {
        if !self.is_open(pager) {
            return Navigation::Ignored;
        }
        match key {
            Key::ArrowRight => self.next(pager).await,
            Key::ArrowLeft => self.previous(pager),
            Key::Escape => {
                self.close();
                Navigation::Closed
            }
            Key::Other => Navigation::Ignored,
        }
    }

    /// `"{cursor + 1} / {N}"`, N being the total when known.
    pub fn counter(&self, pager: &AlbumPager) -> Option<String> {
        let index = self.cursor(pager)?;
        let total = pager
            .total_count()
            .unwrap_or(pager.len() as u64);
        Some(format!("{} / {}", index + 1, total))
    }

    fn sync(&mut self, pager: &AlbumPager) -> Option<usize> {
        let index = self.cursor(pager);
        if index.is_none() {
            self.cursor = None;
        }
        index
    }

    fn move_to(&mut self, index: usize, pager: &AlbumPager) -> Navigation {
        self.cursor = Some((index, pager.generation()));
        Navigation::Moved(index)
    }
}
