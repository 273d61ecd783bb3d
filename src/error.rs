use std::time::Duration;
use thiserror::Error;

/// Errors produced while fetching and embedding resources.
///
/// Cloneable so a single failed fetch can be handed to every caller waiting
/// on the same shared future.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Resource {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid CSS rule: {0}")]
    InvalidRule(String),

    #[error("Cannot read rules of cross-origin style sheet {0}")]
    CrossOrigin(String),

    #[error("Provided element is not within a document")]
    MissingOwnerDocument,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EmbedError {
    /// Failures that the pipeline recovers from by falling back to the
    /// remote reference or a placeholder payload.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EmbedError::MissingOwnerDocument | EmbedError::Configuration(_)
        )
    }
}

impl From<std::io::Error> for EmbedError {
    fn from(err: std::io::Error) -> Self {
        EmbedError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(err: serde_json::Error) -> Self {
        EmbedError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return EmbedError::HttpStatus {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            };
        }
        EmbedError::Network(err.to_string())
    }
}

impl From<url::ParseError> for EmbedError {
    fn from(err: url::ParseError) -> Self {
        EmbedError::InvalidUrl(err.to_string())
    }
}
