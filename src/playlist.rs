//! Ordered playlist plus the single cursor shared by every cast loop.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::media::{MediaId, MediaItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[serde(alias = "mtime")]
    ModifiedTime,
    Filename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistOrder {
    Shuffled,
    Sorted(SortKey),
}

impl PlaylistOrder {
    pub fn new(shuffle: bool, sort: SortKey) -> Self {
        if shuffle {
            Self::Shuffled
        } else {
            Self::Sorted(sort)
        }
    }
}

/// Immutable ordered sequence of items.
#[derive(Debug, Clone)]
pub struct Playlist {
    items: Arc<[MediaItem]>,
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            items: Arc::from(Vec::new()),
        }
    }
}

impl Playlist {
    pub fn build<R: Rng + ?Sized>(
        mut items: Vec<MediaItem>,
        order: PlaylistOrder,
        rng: &mut R,
    ) -> Self {
        match order {
            PlaylistOrder::Shuffled => items.shuffle(rng),
            PlaylistOrder::Sorted(SortKey::ModifiedTime) => items.sort_by_key(|i| i.modified),
            PlaylistOrder::Sorted(SortKey::Filename) => {
                items.sort_by(|a, b| a.filename.cmp(&b.filename))
            }
        }
        Self {
            items: items.into(),
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One read of the playlist at the cursor.
#[derive(Debug, Clone)]
pub struct Slot {
    pub item: MediaItem,
    /// Raw cursor value the item was read at.
    pub position: usize,
    generation: u64,
}

#[derive(Debug, Default)]
struct PlaylistState {
    playlist: Playlist,
    cursor: usize,
    generation: u64,
}

/// Shared owner of the playlist and its cursor.
///
/// Every operation is a single critical section, so concurrent loops cannot
/// lose or double-count an advance.
#[derive(Debug, Clone, Default)]
pub struct PlaylistHandle {
    inner: Arc<Mutex<PlaylistState>>,
}

impl PlaylistHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new playlist and resets the cursor to 0.
    pub fn replace(&self, playlist: Playlist) {
        let mut state = self.inner.lock();
        state.playlist = playlist;
        state.cursor = 0;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Item at `cursor mod len`, or `None` while the playlist is empty.
    pub fn current(&self) -> Option<Slot> {
        let state = self.inner.lock();
        let len = state.playlist.len();
        if len == 0 {
            return None;
        }
        let item = state.playlist.items()[state.cursor % len].clone();
        Some(Slot {
            item,
            position: state.cursor,
            generation: state.generation,
        })
    }

    /// Advances the cursor past `slot`. Returns `false` and leaves the cursor
    /// alone when the playlist was replaced after `slot` was read.
    pub fn advance(&self, slot: &Slot) -> bool {
        let mut state = self.inner.lock();
        if state.generation != slot.generation {
            return false;
        }
        state.cursor = state.cursor.wrapping_add(1);
        true
    }

    pub fn playhead(&self) -> usize {
        self.inner.lock().cursor
    }

    pub fn len(&self) -> usize {
        self.inner.lock().playlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &MediaId) -> Option<MediaItem> {
        let state = self.inner.lock();
        state.playlist.items().iter().find(|i| &i.id == id).cloned()
    }

    pub fn ids(&self) -> Vec<MediaId> {
        let state = self.inner.lock();
        state.playlist.items().iter().map(|i| i.id.clone()).collect()
    }

    pub fn snapshot(&self) -> Playlist {
        self.inner.lock().playlist.clone()
    }
}
