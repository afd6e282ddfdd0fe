//! Snapshot of every displayable item across all sources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::config::PlaylistOptions;
use crate::media::MediaItem;
use crate::sources::{SourceEntry, SourceRegistry};

const SECONDS_PER_DAY: u64 = 86_400;

/// Age and resolution limits applied while building the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFilter {
    pub max_age: Duration,
    /// `[min_width, min_height]`; `[0, 0]` disables the check.
    pub min_resolution: [u32; 2],
}

impl IndexFilter {
    pub fn from_options(options: &PlaylistOptions) -> Self {
        Self {
            max_age: Duration::from_secs(options.max_age_days.saturating_mul(SECONDS_PER_DAY)),
            min_resolution: options.min_resolution,
        }
    }

    pub fn needs_dimensions(&self) -> bool {
        self.min_resolution != [0, 0]
    }

    /// Inclusive on the age boundary; entries of unknown size pass the resolution check.
    pub fn admits(&self, entry: &SourceEntry, now: SystemTime) -> bool {
        if let Some(cutoff) = now.checked_sub(self.max_age)
            && entry.modified < cutoff
        {
            return false;
        }
        match entry.dimensions {
            Some((w, h)) if self.needs_dimensions() => {
                w >= self.min_resolution[0] && h >= self.min_resolution[1]
            }
            _ => true,
        }
    }
}

impl Default for IndexFilter {
    fn default() -> Self {
        Self::from_options(&PlaylistOptions::default())
    }
}

#[derive(Debug)]
pub struct MediaIndex {
    current: RwLock<Arc<[MediaItem]>>,
}

impl Default for MediaIndex {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl MediaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists every source concurrently and publishes the filtered result.
    ///
    /// A failing source is logged and contributes nothing; the rebuild
    /// itself never fails.
    #[instrument(skip_all, fields(sources = registry.len()))]
    pub async fn rebuild(
        &self,
        registry: &SourceRegistry,
        filter: &IndexFilter,
        now: SystemTime,
    ) -> Arc<[MediaItem]> {
        let listings = join_all(registry.iter().map(|(origin, adapter)| async move {
            (origin, adapter.kind(), adapter.list().await)
        }))
        .await;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut rejected = 0usize;
        for (origin, kind, listing) in listings {
            let entries = match listing {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(origin, %kind, error = %err, "source listing failed; skipping");
                    continue;
                }
            };
            for entry in entries {
                if !filter.admits(&entry, now) {
                    rejected += 1;
                    continue;
                }
                let item = MediaItem::from_entry(origin, kind, entry);
                if seen.insert(item.id.clone()) {
                    items.push(item);
                }
            }
        }

        let snapshot: Arc<[MediaItem]> = items.into();
        *self.current.write() = Arc::clone(&snapshot);
        info!(items = snapshot.len(), rejected, "media index rebuilt");
        snapshot
    }

    pub fn snapshot(&self) -> Arc<[MediaItem]> {
        Arc::clone(&self.current.read())
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
