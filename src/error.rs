use thiserror::Error;

use crate::media::SourceKind;

/// Library error type for photocast operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A storage backend could not be listed or is not compiled in.
    #[error("{kind} source unavailable: {reason}")]
    SourceUnavailable { kind: SourceKind, reason: String },

    /// Original bytes could not be retrieved from their backend.
    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    /// The original is corrupt or in an unsupported format.
    #[error("failed to decode {path}: {source}")]
    DecodeFailure {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// No cast device answered to the requested friendly name.
    #[error("cast device not found: {0}")]
    DeviceNotFound(String),

    /// A cast device rejected or failed a command.
    #[error("cast device error: {0}")]
    Device(String),

    /// The id is not part of the current playlist.
    #[error("unknown media id: {0}")]
    UnknownMediaId(String),

    /// A runtime setting update was rejected.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Encoding or pipeline error after a successful decode.
    #[error("render error: {0}")]
    Render(anyhow::Error),
}

impl Error {
    pub(crate) fn fetch(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unavailable(kind: SourceKind, reason: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            kind,
            reason: reason.to_string(),
        }
    }
}
