use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("extension discovery failed: {reason}")]
    Discovery { reason: String },

    #[error(transparent)]
    Extensions(#[from] ribbon_extensions::Error),

    #[error(transparent)]
    Cache(#[from] ribbon_cache::Error),

    #[error(transparent)]
    Bindings(#[from] ribbon_bindings::Error),

    #[error("background task failed: {reason}")]
    Task { reason: String },

    #[error("no loaded command with id '{unique_id}'")]
    UnknownCommand { unique_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn discovery(reason: impl std::fmt::Display) -> Self {
        Self::Discovery {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn task(reason: impl std::fmt::Display) -> Self {
        Self::Task {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_command(unique_id: impl Into<String>) -> Self {
        Self::UnknownCommand {
            unique_id: unique_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
