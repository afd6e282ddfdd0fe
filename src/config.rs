use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;

use crate::media::SourceKind;
use crate::playlist::SortKey;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// HTTP listener and the externally reachable URL handed to cast devices.
    pub server: ServerOptions,
    /// Directory holding `<id>.orig` and `<id>.jpg` cache entries.
    pub cache_dir: PathBuf,
    pub logging: LoggingOptions,
    /// Storage backends to index, in priority order.
    pub sources: Vec<SourceConfig>,
    pub playlist: PlaylistOptions,
    pub render: RenderOptions,
    pub cast: CastOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    ///
    /// Credentials missing for a backend that is actually selected are fatal here,
    /// after the environment fallbacks have been applied.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            (1..=100).contains(&self.render.jpeg_quality),
            "render.jpeg-quality must be between 1 and 100"
        );
        ensure!(
            self.render.caption.font_size > 0.0,
            "render.caption.font-size must be positive"
        );
        ensure!(
            !self.cast.slide_interval.is_zero(),
            "cast.slide-interval must be greater than zero"
        );
        ensure!(!self.cast.tick.is_zero(), "cast.tick must be greater than zero");
        ensure!(
            !self.cast.ack_timeout.is_zero(),
            "cast.ack-timeout must be greater than zero"
        );
        ensure!(
            !self.cache_dir.as_os_str().is_empty(),
            "cache-dir must not be empty"
        );
        for (idx, source) in self.sources.iter_mut().enumerate() {
            source
                .resolve()
                .with_context(|| format!("invalid sources[{idx}] ({})", source.kind()))?;
        }
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            cache_dir: PathBuf::from("/tmp/photocastd-cache"),
            logging: LoggingOptions::default(),
            sources: Vec::new(),
            playlist: PlaylistOptions::default(),
            render: RenderOptions::default(),
            cast: CastOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerOptions {
    pub bind_address: SocketAddr,
    /// Base URL cast devices use to fetch `/image/{id}.jpg`.
    pub base_url: Option<String>,
}

impl ServerOptions {
    pub fn image_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_owned(),
            None => format!("http://{}", self.bind_address),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingOptions {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Optional plain-text log file, appended alongside stdout.
    pub file: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    Local(LocalSourceConfig),
    Webdav(WebdavSourceConfig),
    #[serde(rename = "s3", alias = "object-storage")]
    ObjectStorage(ObjectStorageConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Local(_) => SourceKind::Local,
            Self::Webdav(_) => SourceKind::Webdav,
            Self::ObjectStorage(_) => SourceKind::ObjectStorage,
        }
    }

    /// Configured include globs, or the backend default.
    pub fn include_globs(&self) -> Vec<String> {
        let (configured, defaults): (&Option<Vec<String>>, &[&str]) = match self {
            Self::Local(cfg) => (&cfg.include_globs, DEFAULT_LOCAL_GLOBS),
            Self::Webdav(cfg) => (&cfg.include_globs, DEFAULT_REMOTE_GLOBS),
            Self::ObjectStorage(cfg) => (&cfg.include_globs, DEFAULT_REMOTE_GLOBS),
        };
        match configured {
            Some(globs) => globs.clone(),
            None => defaults.iter().map(|g| (*g).to_owned()).collect(),
        }
    }

    fn resolve(&mut self) -> Result<()> {
        match self {
            Self::Local(cfg) => {
                ensure!(
                    !cfg.path.as_os_str().is_empty(),
                    "local source requires a path"
                );
            }
            Self::Webdav(cfg) => {
                for (field, value) in [
                    ("url", &cfg.url),
                    ("username", &cfg.username),
                    ("password", &cfg.password),
                ] {
                    if value.as_deref().is_none_or(str::is_empty) {
                        bail!("webdav source requires `{field}`");
                    }
                }
            }
            Self::ObjectStorage(cfg) => {
                fill_from_env(&mut cfg.access_key, "ACCESS_KEY");
                fill_from_env(&mut cfg.secret_key, "SECRET_KEY");
                fill_from_env(&mut cfg.endpoint_url, "ENDPOINT_URL");
                for (field, value) in [
                    ("bucket", &cfg.bucket),
                    ("access-key", &cfg.access_key),
                    ("secret-key", &cfg.secret_key),
                ] {
                    if value.as_deref().is_none_or(str::is_empty) {
                        bail!("s3 source requires `{field}`");
                    }
                }
            }
        }
        Ok(())
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.is_none()
        && let Ok(value) = std::env::var(var)
    {
        *slot = Some(value);
    }
}

const DEFAULT_LOCAL_GLOBS: &[&str] = &["**/*.jpg", "**/*.jpeg", "**/*.png", "**/*.webp"];
const DEFAULT_REMOTE_GLOBS: &[&str] = &["**/*.jpg", "**/*.jpeg", "**/*.png"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocalSourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub include_globs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebdavSourceConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Collection the recursive listing starts from.
    #[serde(default = "WebdavSourceConfig::default_root")]
    pub root: String,
    #[serde(default)]
    pub include_globs: Option<Vec<String>>,
}

impl WebdavSourceConfig {
    fn default_root() -> String {
        "/".to_owned()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectStorageConfig {
    pub bucket: Option<String>,
    pub endpoint_url: Option<String>,
    #[serde(default = "ObjectStorageConfig::default_region")]
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "ObjectStorageConfig::default_path_style")]
    pub path_style: bool,
    #[serde(default)]
    pub include_globs: Option<Vec<String>>,
}

impl ObjectStorageConfig {
    fn default_region() -> String {
        "us-east-1".to_owned()
    }

    const fn default_path_style() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PlaylistOptions {
    /// Shuffle on every rebuild instead of sorting.
    pub shuffle: bool,
    /// Sort key used when `shuffle` is off.
    pub sort: SortKey,
    /// Items modified longer ago than this are left out of the index.
    pub max_age_days: u64,
    /// Minimum `[width, height]`; enforced where dimensions are cheap to read.
    pub min_resolution: [u32; 2],
    /// Optional deterministic seed for playlist shuffles.
    pub seed: Option<u64>,
}

impl Default for PlaylistOptions {
    fn default() -> Self {
        Self {
            shuffle: true,
            sort: SortKey::ModifiedTime,
            max_age_days: 36_500,
            min_resolution: [0, 0],
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RenderOptions {
    /// Longest edge of rendered output in pixels; 0 disables resizing.
    pub long_edge: u32,
    pub jpeg_quality: u8,
    pub caption: CaptionOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            long_edge: 1920,
            jpeg_quality: 88,
            caption: CaptionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CaptionOptions {
    pub enabled: bool,
    /// Supports `{datetime}` and `{filename}` placeholders.
    pub template: String,
    /// Falls back to a system sans-serif face when unset.
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub shadow: bool,
}

impl Default for CaptionOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            template: "{datetime} · {filename}".to_owned(),
            font_path: None,
            font_size: 28.0,
            shadow: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CastOptions {
    /// Friendly names started when `/api/start` names no devices.
    pub devices: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub slide_interval: Duration,
    /// Granularity at which a waiting loop re-checks its settings.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
    /// Upper bound on how long a restart waits for previous loops to vacate.
    #[serde(with = "humantime_serde")]
    pub restart_grace: Duration,
    #[serde(with = "humantime_serde")]
    pub ack_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub discovery_timeout: Duration,
}

impl Default for CastOptions {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            slide_interval: Duration::from_secs(10),
            tick: Duration::from_millis(100),
            restart_grace: Duration::from_millis(500),
            ack_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(5),
        }
    }
}
