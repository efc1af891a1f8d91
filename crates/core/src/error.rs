//! Error taxonomy shared by the REST side of the SDK.

use crate::config::ConfigError;

/// Errors returned by the HTTP transport and the resource clients.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The response matched neither the success nor the error envelope, or
    /// carried an error detail that has no known meaning for the operation.
    #[error("Unknown {operation} error")]
    Unknown { operation: &'static str },
    /// The server reported that the addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A known, user-facing error detail reported by the server.
    #[error("{0}")]
    Api(String),
    #[error("Nothing to update")]
    NothingToUpdate,
    #[error("Audio processing error: {0}")]
    Audio(String),
}

impl Error {
    pub(crate) fn unknown(operation: &'static str) -> Self {
        Self::Unknown { operation }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::unknown("list voice").to_string(),
            "Unknown list voice error"
        );
        assert_eq!(
            Error::NotFound("Voice does not exist".into()).to_string(),
            "Voice does not exist"
        );
        assert_eq!(Error::NothingToUpdate.to_string(), "Nothing to update");
    }
}
