//! Schema label module.
//!
//! Keeps a concurrent map from table/partition ids to readable names, used
//! to annotate storage key ranges.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        LabelRefresher                           │
//! │  VersionGate ─▶ BatchFetcher (/db-table) ─fallback─▶ FullScan   │
//! │                        │                    (/schema/{db})      │
//! │                        └──────────┬─────────────┘               │
//! │                                   ▼                             │
//! │                      build_labels (table + partitions)          │
//! └───────────────────────────────────┬─────────────────────────────┘
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           LabelMap (DashMap<i64, Arc<ObjectLabel>>)             │
//! │                 read concurrently by consumers                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashSet;
//! use std::sync::Arc;
//! use keylabel::client::HttpMetadataClient;
//! use keylabel::labels::LabelRefresher;
//!
//! let client = Arc::new(HttpMetadataClient::new("http://127.0.0.1:10080")?);
//! let refresher = LabelRefresher::new(client.clone(), client);
//!
//! refresher.refresh(&HashSet::from([100, 101])).await;
//! let label = refresher.lookup(100);
//! ```

mod error;
mod fetch;
mod label;
pub mod model;
mod refresh;
mod version;

pub use error::{RefreshError, RefreshResult};
pub use fetch::{
    batch_path, database_path, BatchFetcher, FetchReport, FullScanFetcher, DEFAULT_BATCH_SIZE,
    SCHEMA_PATH,
};
pub use label::{build_db_table_labels, build_labels, IndexNames, LabelMap, ObjectLabel};
pub use refresh::{LabelRefresher, RefreshOutcome, SkipReason, Strategy};
pub use version::{parse_version, VersionCheck, VersionGate, UNSET_SCHEMA_VERSION};
