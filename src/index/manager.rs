//! Registry of unique indexes, one per (label, property)

use super::unique_index::UniqueIndex;
use crate::graph::{Label, NodeId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Key for identifying an index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyIndexKey {
    pub label: Label,
    pub property: String,
}

impl PropertyIndexKey {
    pub fn new(label: impl Into<Label>, property: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for PropertyIndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.label, self.property)
    }
}

/// Owned by a single store; the store's own lock guards it.
#[derive(Debug, Default)]
pub struct IndexManager {
    indices: HashMap<PropertyIndexKey, UniqueIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fully built index. Replaces any index under the same key.
    pub fn install(&mut self, key: PropertyIndexKey, index: UniqueIndex) {
        self.indices.insert(key, index);
    }

    pub fn has_index(&self, label: &Label, property: &str) -> bool {
        self.get_index(label, property).is_some()
    }

    pub fn get_index(&self, label: &Label, property: &str) -> Option<&UniqueIndex> {
        self.indices
            .iter()
            .find(|(key, _)| &key.label == label && key.property == property)
            .map(|(_, index)| index)
    }

    pub fn lookup(&self, label: &Label, property: &str, value: &PropertyValue) -> Option<NodeId> {
        self.get_index(label, property).and_then(|index| index.get(value))
    }

    /// Properties of `label` that carry a unique index
    pub fn indexed_properties<'a>(&'a self, label: &'a Label) -> impl Iterator<Item = &'a str> + 'a {
        self.indices
            .keys()
            .filter(move |key| &key.label == label)
            .map(|key| key.property.as_str())
    }

    /// Register `value` for `node_id`; returns the conflicting owner if any.
    pub fn index_insert(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) -> Result<(), NodeId> {
        match self.get_index_mut(label, property) {
            Some(index) => index.insert(value, node_id),
            None => Ok(()),
        }
    }

    pub fn index_remove(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) {
        if let Some(index) = self.get_index_mut(label, property) {
            index.remove(value, node_id);
        }
    }

    /// Every indexed (label, property), sorted
    pub fn keys(&self) -> Vec<PropertyIndexKey> {
        let mut keys: Vec<_> = self.indices.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    fn get_index_mut(&mut self, label: &Label, property: &str) -> Option<&mut UniqueIndex> {
        self.indices
            .iter_mut()
            .find(|(key, _)| &key.label == label && key.property == property)
            .map(|(_, index)| index)
    }
}
