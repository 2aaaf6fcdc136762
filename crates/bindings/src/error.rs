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

    #[error(transparent)]
    Cache(#[from] ribbon_cache::Error),

    #[error("building bindings for '{extension}' timed out after {secs}s")]
    Timeout { extension: String, secs: u64 },

    #[error("binding worker for '{extension}' failed: {reason}")]
    Worker { extension: String, reason: String },

    #[error("no engine configured for {language} scripts")]
    NoEngine { language: String },
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
    pub fn no_engine(language: impl Into<String>) -> Self {
        Self::NoEngine {
            language: language.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
