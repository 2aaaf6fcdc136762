use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("extension has no content hash")]
    MissingHash,

    #[error("stale artifact {path}: {reason}")]
    Stale { path: PathBuf, reason: String },
}

impl Error {
    #[must_use]
    pub fn io_at(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn stale(path: &Path, reason: impl Into<String>) -> Self {
        Self::Stale {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
