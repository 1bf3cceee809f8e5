//! Schema descriptions served by the metadata status API.
//!
//! Only the fields needed to build labels are modelled; everything else in
//! the payload is ignored.

use serde::{Deserialize, Serialize};

// ============================================================================
// Names
// ============================================================================

/// Case-insensitive name as stored by the schema layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiStr {
    /// Name as originally declared.
    #[serde(rename = "O", default)]
    pub original: String,
    /// Lowercased name.
    #[serde(rename = "L", default)]
    pub lower: String,
}

impl CiStr {
    pub fn new(name: impl Into<String>) -> Self {
        let original = name.into();
        let lower = original.to_lowercase();
        Self { original, lower }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

// ============================================================================
// Databases
// ============================================================================

/// Lifecycle state of a schema object.
///
/// Encoded on the wire as a small integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum SchemaState {
    /// The object is absent (dropped, or not yet created).
    #[default]
    None,
    DeleteOnly,
    WriteOnly,
    WriteReorganization,
    DeleteReorganization,
    Public,
    ReplicaOnly,
    GlobalTxnOnly,
    /// A state this crate does not know about.
    Other(u8),
}

impl SchemaState {
    /// Check if the object no longer exists in the schema.
    pub fn is_absent(self) -> bool {
        self == SchemaState::None
    }
}

impl From<u8> for SchemaState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::DeleteOnly,
            2 => Self::WriteOnly,
            3 => Self::WriteReorganization,
            4 => Self::DeleteReorganization,
            5 => Self::Public,
            6 => Self::ReplicaOnly,
            7 => Self::GlobalTxnOnly,
            other => Self::Other(other),
        }
    }
}

impl From<SchemaState> for u8 {
    fn from(state: SchemaState) -> Self {
        match state {
            SchemaState::None => 0,
            SchemaState::DeleteOnly => 1,
            SchemaState::WriteOnly => 2,
            SchemaState::WriteReorganization => 3,
            SchemaState::DeleteReorganization => 4,
            SchemaState::Public => 5,
            SchemaState::ReplicaOnly => 6,
            SchemaState::GlobalTxnOnly => 7,
            SchemaState::Other(other) => other,
        }
    }
}

/// A database as listed by `/schema`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbInfo {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "db_name", default)]
    pub name: CiStr,
    #[serde(default)]
    pub state: SchemaState,
}

// ============================================================================
// Tables
// ============================================================================

/// A secondary index of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexInfo {
    pub id: i64,
    #[serde(rename = "idx_name", default)]
    pub name: CiStr,
}

/// One partition of a partitioned table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionDefinition {
    pub id: i64,
    #[serde(default)]
    pub name: CiStr,
}

/// Partitioning information of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub definitions: Vec<PartitionDefinition>,
}

/// A table as listed by `/schema/{db}` or embedded in a `/db-table` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: i64,
    #[serde(default)]
    pub name: CiStr,
    #[serde(rename = "index_info", default, deserialize_with = "null_as_default")]
    pub indices: Vec<IndexInfo>,
    #[serde(default)]
    pub partition: Option<PartitionInfo>,
}

/// A table together with the database that owns it (`/db-table` entries).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbTableInfo {
    pub db_info: DbInfo,
    pub table_info: TableInfo,
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
