//! TOML-based configuration for keylabel.
//!
//! Supports a config file (keylabel.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [metadata]
//! base_url = "http://${TIDB_STATUS_ADDR}"
//! request_timeout_secs = 30
//!
//! [refresh]
//! schema_version_url = "http://${SCHEMA_KV_ADDR}/kv"
//! schema_version_key = "/tidb/ddl/global_schema_version"
//! version_timeout_ms = 1000
//! batch_size = 512
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key holding the cluster-wide schema version.
pub const DEFAULT_SCHEMA_VERSION_KEY: &str = "/tidb/ddl/global_schema_version";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Metadata service connection.
    pub metadata: MetadataSettings,

    /// Label refresh tuning.
    pub refresh: RefreshSettings,
}

/// Metadata service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Base URL of the status API (supports ${ENV_VAR} expansion).
    pub base_url: String,

    /// Timeout for schema requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:10080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl MetadataSettings {
    /// Get the base URL with environment variables expanded.
    pub fn resolved_base_url(&self) -> Result<String, SettingsError> {
        let url = expand_env_vars(&self.base_url)?;
        if url.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "metadata.base_url must not be empty".to_string(),
            ));
        }
        Ok(url)
    }

    /// Get the request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Base URL of the key/value endpoint holding the schema version
    /// (supports ${ENV_VAR} expansion). Must be set explicitly.
    pub schema_version_url: Option<String>,

    /// Key read by the version gate.
    pub schema_version_key: String,

    /// Bound on the version check, in milliseconds.
    pub version_timeout_ms: u64,

    /// Number of table ids per batched request.
    pub batch_size: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            schema_version_url: None,
            schema_version_key: DEFAULT_SCHEMA_VERSION_KEY.to_string(),
            version_timeout_ms: 1000,
            batch_size: 512,
        }
    }
}

impl RefreshSettings {
    /// Get the version source URL with environment variables expanded.
    pub fn resolved_schema_version_url(&self) -> Result<String, SettingsError> {
        let url = match &self.schema_version_url {
            Some(url) => expand_env_vars(url)?,
            None => {
                return Err(SettingsError::InvalidConfig(
                    "refresh.schema_version_url is not set".to_string(),
                ))
            }
        };
        if url.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "refresh.schema_version_url must not be empty".to_string(),
            ));
        }
        Ok(url)
    }

    /// Get the version check timeout as a duration.
    pub fn version_timeout(&self) -> Duration {
        Duration::from_millis(self.version_timeout_ms)
    }

    /// Reject values the refresher cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.batch_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "refresh.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.version_timeout_ms == 0 {
            return Err(SettingsError::InvalidConfig(
                "refresh.version_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.schema_version_key.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "refresh.schema_version_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.refresh.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `KEYLABEL_CONFIG`
    /// 2. `./keylabel.toml`
    /// 3. `~/.config/keylabel/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("KEYLABEL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("keylabel.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("keylabel").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        let mut var_name = String::new();
        if braced {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Lone '$'
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
