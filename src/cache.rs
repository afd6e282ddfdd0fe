//! Two-tier on-disk cache: `<id>.orig` holds fetched remote originals,
//! `<id>.jpg` holds the display-ready render.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::media::{MediaId, MediaItem};
use crate::processing::{self, RenderSpec};
use crate::sources::SourceRegistry;

pub struct RenderCache {
    dir: PathBuf,
    spec: Arc<RenderSpec>,
    sources: Arc<SourceRegistry>,
    gates: Mutex<HashMap<MediaId, Arc<tokio::sync::Mutex<()>>>>,
    renders: AtomicU64,
}

impl RenderCache {
    /// Creates `dir` if needed.
    pub fn new(dir: PathBuf, spec: RenderSpec, sources: Arc<SourceRegistry>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            spec: Arc::new(spec),
            sources,
            gates: Mutex::new(HashMap::new()),
            renders: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn rendered_path(&self, id: &MediaId) -> PathBuf {
        self.dir.join(format!("{id}.jpg"))
    }

    pub fn original_path(&self, id: &MediaId) -> PathBuf {
        self.dir.join(format!("{id}.orig"))
    }

    /// Number of renders that ran to completion since construction.
    pub fn renders_performed(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    fn gate(&self, id: &MediaId) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock();
        Arc::clone(gates.entry(id.clone()).or_default())
    }

    /// Path to the rendered JPEG for `item`, rendering it first if needed.
    ///
    /// Concurrent callers for the same id share one render; failures leave
    /// nothing behind.
    #[instrument(skip_all, fields(id = %item.id))]
    pub async fn resolve(&self, item: &MediaItem) -> Result<PathBuf, Error> {
        let out = self.rendered_path(&item.id);
        if is_file(&out).await {
            return Ok(out);
        }

        let gate = self.gate(&item.id);
        let _guard = gate.lock().await;
        if is_file(&out).await {
            debug!("rendered by a concurrent caller");
            return Ok(out);
        }

        let bytes = self.original_bytes(item).await?;
        let spec = Arc::clone(&self.spec);
        let path = item.path.clone();
        let filename = item.filename.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            processing::render_jpeg(&bytes, &spec, &path, &filename)
        })
        .await
        .map_err(|err| Error::Render(err.into()))?
        .inspect_err(|err| warn!(path = %item.path, error = %err, "render failed"))?;

        write_atomically(&self.dir, &out, rendered).await?;
        self.renders.fetch_add(1, Ordering::Relaxed);
        info!(path = %item.path, "rendered");
        Ok(out)
    }

    async fn original_bytes(&self, item: &MediaItem) -> Result<Vec<u8>, Error> {
        let adapter = self.sources.get(item.origin).ok_or_else(|| {
            Error::fetch(&item.path, format!("no source at position {}", item.origin))
        })?;

        if let Some(local) = adapter.local_path(&item.path) {
            return tokio::fs::read(&local)
                .await
                .map_err(|err| Error::fetch(&item.path, err));
        }

        let orig = self.original_path(&item.id);
        match tokio::fs::read(&orig).await {
            Ok(bytes) => {
                debug!("reusing cached original");
                return Ok(bytes);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let bytes = adapter.fetch(&item.path).await?;
        write_atomically(&self.dir, &orig, bytes.clone()).await?;
        Ok(bytes)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Write into a temp file in `dir`, then rename it over `dest`.
async fn write_atomically(dir: &Path, dest: &Path, bytes: Vec<u8>) -> Result<(), Error> {
    let dir = dir.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(())
}
