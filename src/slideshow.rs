//! Coordinator owning the index, playlist, render cache and cast supervisor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::cache::RenderCache;
use crate::cast::CastConnector;
use crate::config::Configuration;
use crate::error::Error;
use crate::index::{IndexFilter, MediaIndex};
use crate::media::MediaId;
use crate::playlist::{Playlist, PlaylistHandle};
use crate::processing::RenderSpec;
use crate::settings::{SettingsHandle, SlideSettings};
use crate::sources::SourceRegistry;
use crate::tasks::cast_loop::LoopContext;
use crate::tasks::supervisor::{CastSupervisor, DeviceStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub count: usize,
    pub playhead: usize,
    pub devices: Vec<String>,
    pub slide_seconds: f64,
    pub loops: Vec<DeviceStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub devices: Option<Vec<String>>,
    pub shuffle: Option<bool>,
    #[serde(alias = "slide_seconds")]
    pub slide_seconds: Option<f64>,
}

pub struct Slideshow {
    sources: Arc<SourceRegistry>,
    filter: IndexFilter,
    index: MediaIndex,
    playlist: PlaylistHandle,
    cache: RenderCache,
    settings: SettingsHandle,
    supervisor: CastSupervisor,
    rng: Mutex<StdRng>,
    rebuild: tokio::sync::Mutex<()>,
}

impl Slideshow {
    /// `shutdown` parents every cast loop's cancellation token.
    pub fn new(
        config: &Configuration,
        connector: Arc<dyn CastConnector>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let filter = IndexFilter::from_options(&config.playlist);
        let sources = Arc::new(
            SourceRegistry::from_config(&config.sources, filter.needs_dimensions())
                .context("building source registry")?,
        );
        let cache = RenderCache::new(
            config.cache_dir.clone(),
            RenderSpec::from_options(&config.render),
            Arc::clone(&sources),
        )
        .with_context(|| format!("creating cache dir {}", config.cache_dir.display()))?;
        let settings = SettingsHandle::new(SlideSettings::from_config(config));
        let playlist = PlaylistHandle::new();
        let ctx = LoopContext {
            playlist: playlist.clone(),
            settings: settings.clone(),
            connector,
            base_url: config.server.image_base_url(),
            ack_timeout: config.cast.ack_timeout,
        };
        let rng = match config.playlist.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            sources,
            filter,
            index: MediaIndex::new(),
            playlist,
            cache,
            settings,
            supervisor: CastSupervisor::new(ctx, config.cast.restart_grace, shutdown),
            rng: Mutex::new(rng),
            rebuild: tokio::sync::Mutex::new(()),
        })
    }

    pub fn playlist(&self) -> &PlaylistHandle {
        &self.playlist
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Rebuild the index from every source, then the playlist from the index.
    #[instrument(skip(self))]
    pub async fn reindex(&self) -> usize {
        let _rebuilding = self.rebuild.lock().await;
        self.index
            .rebuild(&self.sources, &self.filter, SystemTime::now())
            .await;
        self.rebuild_playlist()
    }

    /// Reorder the current index snapshot without re-listing sources.
    fn rebuild_playlist(&self) -> usize {
        let items = self.index.snapshot().to_vec();
        let order = self.settings.snapshot().order();
        let playlist = Playlist::build(items, order, &mut *self.rng.lock());
        let count = playlist.len();
        self.playlist.replace(playlist);
        info!(count, ?order, "playlist ready");
        count
    }

    pub async fn status(&self) -> Status {
        let settings = self.settings.snapshot();
        Status {
            count: self.playlist.len(),
            playhead: self.playlist.playhead(),
            devices: settings.devices,
            slide_seconds: settings.slide_interval.as_secs_f64(),
            loops: self.supervisor.devices().await,
        }
    }

    /// Apply optional setting overrides, then restart casting.
    ///
    /// # Errors
    /// [`Error::InvalidSetting`] if `slide_seconds` is out of range; nothing
    /// is changed in that case.
    pub async fn start(&self, request: StartRequest) -> Result<Vec<String>, Error> {
        let interval = request
            .slide_seconds
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|err| Error::InvalidSetting(format!("slideSeconds: {err}")))
            })
            .transpose()?;
        if let Some(interval) = interval {
            self.settings.set_slide_interval(interval)?;
        }
        if let Some(shuffle) = request.shuffle {
            self.settings.set_shuffle(shuffle);
            let _rebuilding = self.rebuild.lock().await;
            self.rebuild_playlist();
        }
        let devices = request
            .devices
            .unwrap_or_else(|| self.settings.snapshot().devices);
        Ok(self.supervisor.start(&devices).await)
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    /// Rendered JPEG for an id in the current playlist.
    pub async fn image(&self, id: &str) -> Result<PathBuf, Error> {
        let item = MediaId::parse(id)
            .and_then(|id| self.playlist.find(&id))
            .ok_or_else(|| Error::UnknownMediaId(id.to_owned()))?;
        self.cache.resolve(&item).await
    }

    /// Cancel every loop and wait for devices to be released.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}
