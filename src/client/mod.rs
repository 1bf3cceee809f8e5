//! Metadata client module.
//!
//! The refresh engine talks to the metadata service through two narrow
//! async traits so the transport can be swapped out (or faked in tests):
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │       MetadataClient         │   │     SchemaVersionSource      │
//! │  request(path) -> bytes      │   │  get(key) -> [value]         │
//! │  /db-table?table_ids=...     │   │  /tidb/ddl/global_schema_... │
//! │  /schema, /schema/{db}       │   │                              │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                 │                                  │
//!                 └──────────────┬───────────────────┘
//!                                ▼
//!                     HttpMetadataClient (reqwest)
//! ```

mod error;
mod http;

pub use error::{ClientError, ClientResult};
pub use http::HttpMetadataClient;

use async_trait::async_trait;

/// Trait for fetching raw schema descriptions from the metadata service.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Issue a GET for `path` (relative to the service base) and return the body.
    ///
    /// Implementations must report a missing endpoint as
    /// [`ClientError::NotFound`].
    async fn request(&self, path: &str) -> ClientResult<Vec<u8>>;
}

/// Trait for reading the schema version marker.
///
/// Mirrors a key/value store read: a key may hold zero, one, or several
/// values. The version gate only accepts exactly one.
#[async_trait]
pub trait SchemaVersionSource: Send + Sync {
    /// Read every value stored under `key`.
    async fn get(&self, key: &str) -> ClientResult<Vec<Vec<u8>>>;
}
