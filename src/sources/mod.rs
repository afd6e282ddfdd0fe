//! Storage backends that list and fetch media objects.

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "webdav")]
pub mod webdav;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{error, info};

use crate::config::SourceConfig;
use crate::error::Error;
use crate::media::SourceKind;

/// One listed object before it becomes a [`MediaItem`](crate::media::MediaItem).
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub path: String,
    pub modified: SystemTime,
    pub size_bytes: u64,
    pub filename: String,
    /// Pixel dimensions when the backend can read them without a full fetch.
    pub dimensions: Option<(u32, u32)>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Every object matching the include globs.
    async fn list(&self) -> Result<Vec<SourceEntry>, Error>;

    /// Raw bytes of one listed object.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, Error>;

    /// Filesystem location for backends whose objects are already on disk.
    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

/// Case-insensitive glob filter over paths relative to a source root.
#[derive(Debug, Clone)]
pub struct IncludeFilter {
    set: GlobSet,
}

impl IncludeFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(false)
                .build()
                .with_context(|| format!("invalid include glob {pattern:?}"))?;
            builder.add(glob);
        }
        Ok(Self {
            set: builder.build().context("failed to compile include globs")?,
        })
    }

    pub fn matches(&self, relative: &str) -> bool {
        let normalized = relative.replace('\\', "/");
        self.set.is_match(normalized.trim_start_matches('/'))
    }
}

/// Last path segment of a `/`-separated locator.
pub fn file_name_of(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_owned()
}

/// Stand-in for a backend whose client is not compiled into this build.
pub struct UnavailableSource {
    kind: SourceKind,
    reason: &'static str,
}

impl UnavailableSource {
    pub fn new(kind: SourceKind, reason: &'static str) -> Self {
        Self { kind, reason }
    }
}

#[async_trait]
impl SourceAdapter for UnavailableSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn list(&self) -> Result<Vec<SourceEntry>, Error> {
        error!(kind = %self.kind, reason = self.reason, "source requested but unavailable");
        Ok(Vec::new())
    }

    async fn fetch(&self, _path: &str) -> Result<Vec<u8>, Error> {
        Err(Error::unavailable(self.kind, self.reason))
    }
}

/// Configured adapters, addressed by their position in the config.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn from_config(configs: &[SourceConfig], read_dimensions: bool) -> Result<Self> {
        #[cfg(any(feature = "webdav", feature = "s3"))]
        let client = reqwest::Client::builder()
            .user_agent(concat!("photocastd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(configs.len());
        for cfg in configs {
            let include = IncludeFilter::new(cfg.include_globs().as_slice())?;
            let adapter: Arc<dyn SourceAdapter> = match cfg {
                SourceConfig::Local(local) => Arc::new(local::LocalSource::new(
                    local.path.clone(),
                    include,
                    read_dimensions,
                )),
                #[cfg(feature = "webdav")]
                SourceConfig::Webdav(dav) => {
                    Arc::new(webdav::WebdavSource::new(dav, include, client.clone())?)
                }
                #[cfg(not(feature = "webdav"))]
                SourceConfig::Webdav(_) => Arc::new(UnavailableSource::new(
                    SourceKind::Webdav,
                    "built without the `webdav` feature",
                )),
                #[cfg(feature = "s3")]
                SourceConfig::ObjectStorage(s3cfg) => {
                    Arc::new(s3::ObjectStorageSource::new(s3cfg, include, client.clone())?)
                }
                #[cfg(not(feature = "s3"))]
                SourceConfig::ObjectStorage(_) => Arc::new(UnavailableSource::new(
                    SourceKind::ObjectStorage,
                    "built without the `s3` feature",
                )),
            };
            info!(kind = %adapter.kind(), "registered source");
            adapters.push(adapter);
        }
        Ok(Self { adapters })
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<dyn SourceAdapter>)> {
        self.adapters.iter().enumerate()
    }

    pub fn get(&self, origin: usize) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(origin)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_match_case_insensitively_at_any_depth() {
        let filter = IncludeFilter::new(&["**/*.jpg", "**/*.jpeg"]).unwrap();
        assert!(filter.matches("a.jpg"));
        assert!(filter.matches("2024/summer/B.JPG"));
        assert!(filter.matches("/2024/c.Jpeg"));
        assert!(!filter.matches("notes.txt"));
        assert!(!filter.matches("movie.mp4"));
    }

    #[test]
    fn directory_scoped_glob() {
        let filter = IncludeFilter::new(&["albums/**/*.png"]).unwrap();
        assert!(filter.matches("Albums/x/y.PNG"));
        assert!(!filter.matches("other/y.png"));
    }

    #[test]
    fn file_name_of_handles_separators() {
        assert_eq!(file_name_of("/a/b/c.jpg"), "c.jpg");
        assert_eq!(file_name_of("c.jpg"), "c.jpg");
        assert_eq!(file_name_of("prefix/key.png"), "key.png");
    }
}
