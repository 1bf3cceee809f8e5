//! Object labels and the concurrent lookup that holds them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::model::{DbTableInfo, TableInfo};

/// Index id to declared index name, shared by a table and its partitions.
pub type IndexNames = Arc<BTreeMap<i64, String>>;

/// Human-readable naming for one table or partition id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLabel {
    /// Table name, or `"<table>/<partition>"` for a partition.
    pub name: String,
    /// Owning database name.
    pub database: String,
    /// Table or partition id.
    pub id: i64,
    /// Secondary index names of the (parent) table.
    pub indices: IndexNames,
}

impl ObjectLabel {
    /// Look up the declared name of an index of this object.
    pub fn index_name(&self, index_id: i64) -> Option<&str> {
        self.indices.get(&index_id).map(String::as_str)
    }
}

impl fmt::Display for ObjectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}

/// Build the labels for a table and each of its partitions.
///
/// The index map is built once and shared by every returned label.
pub fn build_labels(database: &str, table: &TableInfo) -> Vec<ObjectLabel> {
    let indices: IndexNames = Arc::new(
        table
            .indices
            .iter()
            .map(|index| (index.id, index.name.original.clone()))
            .collect(),
    );

    let table_name = table.name.as_str();
    let partitions = table
        .partition
        .as_ref()
        .map(|p| p.definitions.as_slice())
        .unwrap_or_default();

    let mut labels = Vec::with_capacity(1 + partitions.len());
    labels.push(ObjectLabel {
        name: table_name.to_string(),
        database: database.to_string(),
        id: table.id,
        indices: indices.clone(),
    });
    labels.extend(partitions.iter().map(|def| ObjectLabel {
        name: format!("{}/{}", table_name, def.name.as_str()),
        database: database.to_string(),
        id: def.id,
        indices: indices.clone(),
    }));
    labels
}

/// Build labels from a `/db-table` entry.
pub fn build_db_table_labels(entry: &DbTableInfo) -> Vec<ObjectLabel> {
    build_labels(entry.db_info.name.as_str(), &entry.table_info)
}

/// Concurrent id to label lookup.
///
/// Cloning a `LabelMap` yields another handle to the same map. Entries are
/// only inserted or overwritten, never removed; each entry is swapped in
/// whole, so readers see either the old or the new label.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    entries: Arc<DashMap<i64, Arc<ObjectLabel>>>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the label for a table or partition id.
    pub fn get(&self, id: i64) -> Option<Arc<ObjectLabel>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert or overwrite one label.
    pub fn insert(&self, label: ObjectLabel) {
        self.entries.insert(label.id, Arc::new(label));
    }

    /// Insert every label, returning how many were written.
    pub fn extend(&self, labels: impl IntoIterator<Item = ObjectLabel>) -> usize {
        labels.into_iter().fold(0, |n, label| {
            self.insert(label);
            n + 1
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy out every entry, ordered by id.
    pub fn snapshot(&self) -> BTreeMap<i64, Arc<ObjectLabel>> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }
}
