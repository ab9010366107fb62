//! Graph nodes

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId};
use serde::{Deserialize, Serialize};

/// A labelled node with properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    /// Bumped on every property merge
    pub version: u64,

    pub label: Label,

    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Node {
    pub fn new(id: NodeId, label: impl Into<Label>) -> Self {
        Self::new_with_properties(id, label, PropertyMap::new())
    }

    /// Create a node; null properties are not stored.
    pub fn new_with_properties(id: NodeId, label: impl Into<Label>, properties: PropertyMap) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Node {
            id,
            version: 1,
            label: label.into(),
            properties: properties.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_label(&self, label: &Label) -> bool {
        &self.label == label
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        let old = self.properties.insert(key.into(), value.into());
        self.touch();
        old
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Text value of a property, if it is a string
    pub fn text(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_string)
    }

    /// Merge `incoming` into this node, last write wins.
    ///
    /// A null incoming value removes the property.
    pub fn merge_properties(&mut self, incoming: PropertyMap) {
        for (key, value) in incoming {
            if value.is_null() {
                self.properties.remove(&key);
            } else {
                self.properties.insert(key, value);
            }
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}
