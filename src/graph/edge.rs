//! Directed, typed relationships

use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeType, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,

    /// Edge goes FROM this node
    pub source: NodeId,

    /// Edge goes TO this node
    pub target: NodeId,

    pub edge_type: EdgeType,

    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId, edge_type: impl Into<EdgeType>) -> Self {
        Self::new_with_properties(id, source, target, edge_type, PropertyMap::new())
    }

    pub fn new_with_properties(
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> Self {
        Edge {
            id,
            source,
            target,
            edge_type: edge_type.into(),
            properties: properties.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// True when every discriminant property equals the stored value.
    ///
    /// A null discriminant matches an absent property.
    pub fn matches(&self, discriminant: &PropertyMap) -> bool {
        discriminant.iter().all(|(key, value)| match self.properties.get(key) {
            Some(stored) => stored == value,
            None => value.is_null(),
        })
    }

    /// Merge `incoming`; a null value removes the property.
    pub fn merge_properties(&mut self, incoming: PropertyMap) {
        for (key, value) in incoming {
            if value.is_null() {
                self.properties.remove(&key);
            } else {
                self.properties.insert(key, value);
            }
        }
    }

    pub fn connects(&self, source: NodeId, target: NodeId) -> bool {
        self.source == source && self.target == target
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Edge {}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_discriminant_matching() {
        let edge = Edge::new_with_properties(
            EdgeId::new(1),
            NodeId::new(1),
            NodeId::new(2),
            "SPONSORS",
            props(&[("role", "lead_sponsor".into())]),
        );

        assert!(edge.connects(NodeId::new(1), NodeId::new(2)));
        assert!(!edge.connects(NodeId::new(2), NodeId::new(1)));
        assert!(edge.matches(&props(&[("role", "lead_sponsor".into())])));
        assert!(!edge.matches(&props(&[("role", "collaborator".into())])));
        assert!(edge.matches(&PropertyMap::new()));
        assert!(edge.matches(&props(&[("other", PropertyValue::Null)])));
    }

    #[test]
    fn test_merge() {
        let mut edge = Edge::new(EdgeId::new(1), NodeId::new(1), NodeId::new(2), "HAS_STAT");
        edge.merge_properties(props(&[("numEvents", 3i64.into()), ("numAtRisk", PropertyValue::Null)]));
        assert_eq!(edge.get_property("numEvents").and_then(|v| v.as_integer()), Some(3));
        assert!(edge.get_property("numAtRisk").is_none());
    }
}
