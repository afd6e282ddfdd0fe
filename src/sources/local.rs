//! Local directory source.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use super::{IncludeFilter, SourceAdapter, SourceEntry};
use crate::error::Error;
use crate::media::SourceKind;

pub struct LocalSource {
    root: PathBuf,
    include: IncludeFilter,
    read_dimensions: bool,
}

impl LocalSource {
    pub fn new(root: PathBuf, include: IncludeFilter, read_dimensions: bool) -> Self {
        Self {
            root,
            include,
            read_dimensions,
        }
    }
}

#[async_trait]
impl SourceAdapter for LocalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn list(&self) -> Result<Vec<SourceEntry>, Error> {
        let root = self.root.clone();
        let include = self.include.clone();
        let read_dimensions = self.read_dimensions;
        tokio::task::spawn_blocking(move || scan_root(&root, &include, read_dimensions))
            .await
            .map_err(|err| Error::unavailable(SourceKind::Local, err))?
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, Error> {
        tokio::fs::read(path)
            .await
            .map_err(|err| Error::fetch(path, err))
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        Some(PathBuf::from(path))
    }
}

/// Recursively list files under `root` whose root-relative path matches `include`.
///
/// # Errors
/// Returns [`Error::SourceUnavailable`] if `root` is missing or not a directory.
#[instrument(skip(root, include), fields(root = %root.display()))]
pub fn scan_root(
    root: &Path,
    include: &IncludeFilter,
    read_dimensions: bool,
) -> Result<Vec<SourceEntry>, Error> {
    if !root.is_dir() {
        return Err(Error::unavailable(
            SourceKind::Local,
            format!("{} is not a readable directory", root.display()),
        ));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        // Skip hidden dot-directories *below* the root only.
        .filter_entry(|e| !should_skip_dir(e))
        .flatten()
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !include.matches(&relative.to_string_lossy()) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let dimensions = if read_dimensions {
            image::image_dimensions(path).ok()
        } else {
            None
        };
        out.push(SourceEntry {
            path: path.to_string_lossy().into_owned(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size_bytes: meta.len(),
            filename: entry.file_name().to_string_lossy().into_owned(),
            dimensions,
        });
    }
    debug!(discovered = out.len(), "local scan complete");
    Ok(out)
}

fn should_skip_dir(entry: &DirEntry) -> bool {
    // Never skip the root; tempfile roots can be dot-dirs.
    if entry.depth() == 0 {
        return false;
    }
    if !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_skips_hidden_dirs_and_non_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::create_dir_all(dir.path().join(".thumbs")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("nested").join("B.JPEG"), b"x").unwrap();
        fs::write(dir.path().join(".thumbs").join("c.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let include = IncludeFilter::new(&["**/*.jpg", "**/*.jpeg"]).unwrap();
        let mut names: Vec<String> = scan_root(dir.path(), &include, false)
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        names.sort();
        assert_eq!(names, vec!["B.JPEG".to_string(), "a.jpg".to_string()]);
    }

    #[test]
    fn missing_root_is_unavailable() {
        let include = IncludeFilter::new(&["**/*.jpg"]).unwrap();
        let err = scan_root(Path::new("/definitely/not/here"), &include, false).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }
}
