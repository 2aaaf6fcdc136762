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

    #[error("not an extension directory: {path}")]
    NotAnExtension { path: PathBuf },

    #[error("invalid bundle file {path}: {reason}")]
    InvalidBundle { path: PathBuf, reason: String },

    #[error("{message}")]
    Message { message: String },
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
    pub fn not_an_extension(path: &Path) -> Self {
        Self::NotAnExtension {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn invalid_bundle(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidBundle {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
