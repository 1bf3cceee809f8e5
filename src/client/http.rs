//! reqwest-backed metadata client.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::error::{ClientError, ClientResult};
use super::{MetadataClient, SchemaVersionSource};
use crate::config::{Settings, SettingsError};

/// Default timeout for metadata requests (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the metadata service status API.
///
/// # Example
///
/// ```ignore
/// use keylabel::client::{HttpMetadataClient, MetadataClient};
///
/// let client = HttpMetadataClient::new("http://127.0.0.1:10080")?;
/// let body = client.request("/schema").await?;
/// ```
#[derive(Clone)]
pub struct HttpMetadataClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl Debug for HttpMetadataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetadataClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpMetadataClient {
    /// Create a client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::transport)?;

        // Paths always start with '/'
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Create a client from the `[metadata]` settings section.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let base_url = settings.metadata.resolved_base_url()?;
        Self::with_timeout(base_url, settings.metadata.request_timeout())
            .map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }

    /// Create the version source from the `[refresh]` settings section.
    ///
    /// The version key lives on a separate key/value endpoint, so
    /// `refresh.schema_version_url` must be set.
    pub fn version_source_from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let base_url = settings.refresh.resolved_schema_version_url()?;
        Self::with_timeout(base_url, settings.refresh.version_timeout())
            .map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_bytes(&self, path: &str) -> ClientResult<Vec<u8>> {
        let response = self.client.get(self.url(path)).send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::from(e)
            }
        })?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound {
                path: path.to_string(),
            }),
            _ => Err(ClientError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn request(&self, path: &str) -> ClientResult<Vec<u8>> {
        self.get_bytes(path).await
    }
}

#[async_trait]
impl SchemaVersionSource for HttpMetadataClient {
    async fn get(&self, key: &str) -> ClientResult<Vec<Vec<u8>>> {
        let body = self.get_bytes(key).await?;
        Ok(split_values(&body))
    }
}

/// Split a key read response into its values.
///
/// A JSON array yields one value per element; any other body is a single
/// raw value. An empty body holds no values.
fn split_values(body: &[u8]) -> Vec<Vec<u8>> {
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_slice::<Vec<serde_json::Value>>(trimmed) {
        Ok(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s.into_bytes(),
                other => other.to_string().into_bytes(),
            })
            .collect(),
        Err(_) => vec![trimmed.to_vec()],
    }
}
