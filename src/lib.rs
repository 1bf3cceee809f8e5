//! # keylabel
//!
//! Resolves the numeric table and partition ids found in storage keys to
//! readable names (database, table or partition, and index names).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          external scheduler (every few seconds)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │ refresh(known ids)
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 labels::LabelRefresher                  │
//! │   version gate → batched fetch / full scan → commit     │
//! └─────────────────────────────────────────────────────────┘
//!            │ client::MetadataClient          │ writes
//!            ▼                                 ▼
//! ┌───────────────────────────┐   ┌─────────────────────────┐
//! │ metadata service (HTTP)   │   │    labels::LabelMap     │◀── readers
//! └───────────────────────────┘   └─────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod labels;

pub use client::{HttpMetadataClient, MetadataClient, SchemaVersionSource};
pub use config::Settings;
pub use labels::{LabelMap, LabelRefresher, ObjectLabel, RefreshOutcome};
