//! Label refresh error types.

use thiserror::Error;

use crate::client::ClientError;

/// Result type for refresh operations.
pub type RefreshResult<T> = Result<T, RefreshError>;

/// Errors that can occur while refreshing the label map.
///
/// None of these escape a refresh cycle; they are logged and decide whether
/// the schema version may be committed.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// The metadata client failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A schema response could not be decoded.
    #[error("schema API unmarshal failed for {path}: {source}")]
    Decode {
        /// Request path whose body was malformed.
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The version key held something other than a decimal integer.
    #[error("invalid schema version {value:?}")]
    InvalidVersion {
        /// Raw value, lossily decoded.
        value: String,
    },

    /// The version key did not hold exactly one value.
    #[error("expected one schema version value, got {0}")]
    UnexpectedVersionCount(usize),

    /// The batched table endpoint does not exist on this deployment.
    #[error("batched table endpoint is not available")]
    EndpointUnavailable,

    /// Some units of a fetch failed while others were applied.
    #[error("{failed} of {total} requests failed")]
    PartialApply {
        /// Units that failed.
        failed: usize,
        /// Units attempted.
        total: usize,
    },
}

impl RefreshError {
    /// Create a decode error for a request path.
    pub fn decode(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }

    /// Check if this error should permanently disable the batched endpoint.
    pub fn is_endpoint_unavailable(&self) -> bool {
        matches!(self, Self::EndpointUnavailable)
    }
}
