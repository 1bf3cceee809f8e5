//! Configuration module for keylabel.
//!
//! Handles the metadata service endpoint and refresh tuning.

mod settings;

pub use settings::{
    expand_env_vars, MetadataSettings, RefreshSettings, Settings, SettingsError,
    DEFAULT_SCHEMA_VERSION_KEY,
};
