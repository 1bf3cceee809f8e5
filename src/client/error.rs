//! Metadata client error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for metadata client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by a [`MetadataClient`](super::MetadataClient) or
/// [`SchemaVersionSource`](super::SchemaVersionSource).
///
/// Failures are classified at the transport boundary so callers never need
/// to inspect message text.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The requested endpoint does not exist on the metadata service.
    #[error("endpoint not found: {path}")]
    NotFound {
        /// Request path that was not found.
        path: String,
    },

    /// The service answered with a non-success status other than 404.
    #[error("unexpected status {status} for {path}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request path.
        path: String,
    },

    /// The request could not be sent or the response body could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Create a transport error from any displayable cause.
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Check if this error means the endpoint is missing on this deployment.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
