use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_convert() {
        let err: Error = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn message_displays_verbatim() {
        assert_eq!(Error::message("no context").to_string(), "no context");
    }
}
