//! Schema version gate.
//!
//! Reads the cluster-wide schema version and compares it with the last
//! committed one, so unchanged schemas cost a single key read per cycle.

use std::time::Duration;

use super::error::RefreshError;
use crate::client::{ClientError, SchemaVersionSource};

/// Version marker before any refresh has been committed.
pub const UNSET_SCHEMA_VERSION: i64 = -1;

/// Outcome of a version check.
#[derive(Debug)]
pub enum VersionCheck {
    /// The schema moved to a new version.
    Changed(i64),
    /// The schema is still at the committed version.
    Unchanged(i64),
    /// No decision is possible this cycle.
    Unavailable {
        /// No version had been committed when the read failed.
        first_attempt: bool,
        error: RefreshError,
    },
}

/// Compares the live schema version against the committed one.
pub struct VersionGate<'a> {
    source: &'a dyn SchemaVersionSource,
    key: &'a str,
    timeout: Duration,
}

impl<'a> VersionGate<'a> {
    pub fn new(source: &'a dyn SchemaVersionSource, key: &'a str, timeout: Duration) -> Self {
        Self {
            source,
            key,
            timeout,
        }
    }

    /// Fetch the live version and compare it with `committed`.
    pub async fn check(&self, committed: i64) -> VersionCheck {
        let version = match self.fetch().await {
            Ok(version) => version,
            Err(error) => {
                let first_attempt = committed == UNSET_SCHEMA_VERSION;
                if is_missing_key(&error) {
                    // Never answered by a live source, so the URL is wrong
                    tracing::warn!(key = self.key, error = %error, "schema version key not found");
                } else if first_attempt {
                    tracing::debug!(error = %error, "failed to get schema version, maybe not a db cluster");
                } else {
                    tracing::warn!(error = %error, "failed to get schema version");
                }
                return VersionCheck::Unavailable {
                    first_attempt,
                    error,
                };
            }
        };

        if version == committed {
            tracing::debug!(version, "schema version has not changed, skip this update");
            return VersionCheck::Unchanged(version);
        }

        tracing::debug!(old = committed, new = version, "schema version has changed");
        VersionCheck::Changed(version)
    }

    async fn fetch(&self) -> Result<i64, RefreshError> {
        let values = tokio::time::timeout(self.timeout, self.source.get(self.key))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))??;

        match values.as_slice() {
            [value] => parse_version(value),
            other => Err(RefreshError::UnexpectedVersionCount(other.len())),
        }
    }
}

fn is_missing_key(error: &RefreshError) -> bool {
    matches!(error, RefreshError::Client(e) if e.is_not_found())
}

/// Parse a version value as a signed decimal integer.
pub fn parse_version(raw: &[u8]) -> Result<i64, RefreshError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| RefreshError::InvalidVersion {
            value: String::from_utf8_lossy(raw).into_owned(),
        })
}
