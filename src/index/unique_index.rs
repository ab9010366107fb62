//! Hash index mapping one key value to exactly one node

use crate::graph::{NodeId, PropertyValue};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    /// Canonical key text -> owning node
    entries: FxHashMap<String, NodeId>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` for `node_id`.
    ///
    /// Returns the current owner when the value already belongs to another
    /// node. Null values are never indexed.
    pub fn insert(&mut self, value: &PropertyValue, node_id: NodeId) -> Result<(), NodeId> {
        let Some(key) = value.index_key() else {
            return Ok(());
        };
        match self.entries.get(&key) {
            Some(&owner) if owner != node_id => Err(owner),
            _ => {
                self.entries.insert(key, node_id);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, value: &PropertyValue, node_id: NodeId) {
        if let Some(key) = value.index_key() {
            if self.entries.get(&key) == Some(&node_id) {
                self.entries.remove(&key);
            }
        }
    }

    pub fn get(&self, value: &PropertyValue) -> Option<NodeId> {
        value.index_key().and_then(|key| self.entries.get(&key).copied())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
