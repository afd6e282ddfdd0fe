//! Media items and their content-derived identifiers.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::sources::SourceEntry;

/// Storage backend an item was listed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Local,
    Webdav,
    #[serde(rename = "s3")]
    ObjectStorage,
}

impl SourceKind {
    /// Stable tag hashed into every [`MediaId`]; changing it re-keys the cache.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Webdav => "webdav",
            Self::ObjectStorage => "s3",
        }
    }

    pub const fn is_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truncated SHA-1 of `"{kind}:{path}"`, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub const LEN: usize = 16;

    pub fn derive(kind: SourceKind, path: &str) -> Self {
        let digest = Sha1::digest(format!("{}:{}", kind.as_str(), path).as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(Self::LEN);
        Self(encoded)
    }

    /// Accepts only well-formed ids, so a parsed id is always safe to use as a file stem.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == Self::LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One displayable asset. Rebuilt from scratch on every index build and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: MediaId,
    pub source_kind: SourceKind,
    /// Position of the producing source in the configured source list.
    pub origin: usize,
    pub path: String,
    pub modified: SystemTime,
    pub size_bytes: u64,
    pub filename: String,
}

impl MediaItem {
    pub fn from_entry(origin: usize, kind: SourceKind, entry: SourceEntry) -> Self {
        Self {
            id: MediaId::derive(kind, &entry.path),
            source_kind: kind,
            origin,
            path: entry.path,
            modified: entry.modified,
            size_bytes: entry.size_bytes,
            filename: entry.filename,
        }
    }
}
