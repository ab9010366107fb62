//! In-memory property graph
//!
//! Nodes and edges live in id-indexed arenas with adjacency lists in both
//! directions, a label index and an edge type index. Uniqueness constraints
//! are backed by [`IndexManager`]; merges look nodes up through them when
//! present and fall back to a label scan otherwise.

use super::edge::Edge;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeType, Label, NodeId};
use crate::index::{IndexManager, PropertyIndexKey, UniqueIndex};
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Invalid edge: source node {0} does not exist")]
    InvalidEdgeSource(NodeId),

    #[error("Invalid edge: target node {0} does not exist")]
    InvalidEdgeTarget(NodeId),

    #[error("Cannot merge {label} on null {property}")]
    NullMergeKey { label: Label, property: String },

    #[error("Unique constraint on {key} violated by value {value}")]
    ConstraintViolation { key: PropertyIndexKey, value: String },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// What a node merge did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub id: NodeId,
    pub created: bool,
}

#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<Option<Node>>,

    edges: Vec<Option<Edge>>,

    /// Outgoing edges for each node slot
    outgoing: Vec<Vec<EdgeId>>,

    /// Incoming edges for each node slot
    incoming: Vec<Vec<EdgeId>>,

    label_index: HashMap<Label, HashSet<NodeId>>,

    edge_type_index: HashMap<EdgeType, HashSet<EdgeId>>,

    /// Parallel edges per (source, target, type), for merges
    edge_keys: FxHashMap<(NodeId, NodeId, EdgeType), Vec<EdgeId>>,

    /// Unique constraints
    constraints: IndexManager,

    next_node_id: u64,

    next_edge_id: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_node_slot(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        self.ensure_node_capacity(id);
        id
    }

    fn ensure_node_capacity(&mut self, id: NodeId) {
        let idx = id.slot();
        if idx >= self.nodes.len() {
            self.nodes.resize(idx + 1, None);
            self.outgoing.resize(idx + 1, Vec::new());
            self.incoming.resize(idx + 1, Vec::new());
        }
    }

    fn ensure_edge_capacity(&mut self, id: EdgeId) {
        let idx = id.slot();
        if idx >= self.edges.len() {
            self.edges.resize(idx + 1, None);
        }
    }

    /// Create an empty node with a single label
    pub fn create_node(&mut self, label: impl Into<Label>) -> NodeId {
        let id = self.allocate_node_slot();
        let node = Node::new(id, label);
        self.index_label(&node);
        self.nodes[id.slot()] = Some(node);
        id
    }

    /// Create a node with properties, honouring unique constraints.
    pub fn create_node_with_properties(&mut self, label: impl Into<Label>, properties: PropertyMap) -> GraphResult<NodeId> {
        let label = label.into();
        self.check_unique(&label, &properties, None)?;

        let id = self.allocate_node_slot();
        let node = Node::new_with_properties(id, label, properties);
        self.register_unique(&node);
        self.index_label(&node);
        self.nodes[id.slot()] = Some(node);
        Ok(id)
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.get_node(id).is_some()
    }

    /// Find the node of `label` whose `property` equals `value`.
    pub fn find_node(&self, label: &Label, property: &str, value: &PropertyValue) -> Option<NodeId> {
        if value.is_null() {
            return None;
        }
        if self.constraints.has_index(label, property) {
            return self.constraints.lookup(label, property, value);
        }
        self.label_index.get(label).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|id| self.get_node(*id).and_then(|n| n.get_property(property)) == Some(value))
        })
    }

    /// Upsert the node of `label` identified by `properties[key_property]`.
    ///
    /// An existing node has `properties` merged in (a null value removes the
    /// property); otherwise a new node is created with the non-null values.
    pub fn merge_node(&mut self, label: impl Into<Label>, key_property: &str, properties: PropertyMap) -> GraphResult<MergeOutcome> {
        let label = label.into();
        let key_value = properties.get(key_property).cloned().unwrap_or(PropertyValue::Null);
        if key_value.is_null() {
            return Err(GraphError::NullMergeKey {
                label,
                property: key_property.to_string(),
            });
        }

        match self.find_node(&label, key_property, &key_value) {
            Some(id) => {
                self.check_unique(&label, &properties, Some(id))?;
                let Some(node) = self.nodes.get_mut(id.slot()).and_then(Option::as_mut) else {
                    return Err(GraphError::NodeNotFound(id));
                };
                let before = node.properties.clone();
                node.merge_properties(properties);
                let after = node.properties.clone();
                self.reindex_unique(&label, id, &before, &after);
                Ok(MergeOutcome { id, created: false })
            }
            None => {
                let id = self.create_node_with_properties(label, properties)?;
                Ok(MergeOutcome { id, created: true })
            }
        }
    }

    pub fn create_edge(&mut self, source: NodeId, target: NodeId, edge_type: impl Into<EdgeType>) -> GraphResult<EdgeId> {
        self.create_edge_with_properties(source, target, edge_type, PropertyMap::new())
    }

    pub fn create_edge_with_properties(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        if !self.has_node(source) {
            return Err(GraphError::InvalidEdgeSource(source));
        }
        if !self.has_node(target) {
            return Err(GraphError::InvalidEdgeTarget(target));
        }

        let id = EdgeId::new(self.next_edge_id);
        self.next_edge_id += 1;
        let edge = Edge::new_with_properties(id, source, target, edge_type, properties);
        self.link_edge(edge);
        Ok(id)
    }

    /// Upsert the `edge_type` edge from `source` to `target`.
    ///
    /// Edges between the same endpoints are told apart by `discriminant`;
    /// a match has `properties` merged in, otherwise a new edge carries the
    /// discriminant plus the properties.
    pub fn merge_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        discriminant: PropertyMap,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        let edge_type = edge_type.into();
        if !self.has_node(source) {
            return Err(GraphError::InvalidEdgeSource(source));
        }
        if !self.has_node(target) {
            return Err(GraphError::InvalidEdgeTarget(target));
        }

        let existing = self
            .edge_keys
            .get(&(source, target, edge_type.clone()))
            .and_then(|ids| {
                ids.iter()
                    .copied()
                    .find(|eid| self.get_edge(*eid).is_some_and(|e| e.matches(&discriminant)))
            });

        match existing {
            Some(id) => {
                if let Some(edge) = self.edges.get_mut(id.slot()).and_then(Option::as_mut) {
                    edge.merge_properties(properties);
                }
                Ok(id)
            }
            None => {
                let mut all = discriminant;
                all.extend(properties);
                self.create_edge_with_properties(source, target, edge_type, all)
            }
        }
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn get_outgoing_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.outgoing
            .get(node_id.slot())
            .map(|ids| ids.iter().filter_map(|id| self.get_edge(*id)).collect())
            .unwrap_or_default()
    }

    pub fn get_incoming_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.incoming
            .get(node_id.slot())
            .map(|ids| ids.iter().filter_map(|id| self.get_edge(*id)).collect())
            .unwrap_or_default()
    }

    /// Nodes reached from `node_id` over `edge_type` edges
    pub fn neighbors_out(&self, node_id: NodeId, edge_type: &str) -> Vec<&Node> {
        self.get_outgoing_edges(node_id)
            .into_iter()
            .filter(|e| e.edge_type.as_str() == edge_type)
            .filter_map(|e| self.get_node(e.target))
            .collect()
    }

    /// Nodes with `edge_type` edges into `node_id`
    pub fn neighbors_in(&self, node_id: NodeId, edge_type: &str) -> Vec<&Node> {
        self.get_incoming_edges(node_id)
            .into_iter()
            .filter(|e| e.edge_type.as_str() == edge_type)
            .filter_map(|e| self.get_node(e.source))
            .collect()
    }

    /// Nodes of `label`, in id order
    pub fn get_nodes_by_label(&self, label: &Label) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self
            .label_index
            .get(label)
            .map(|ids| ids.iter().filter_map(|id| self.get_node(*id)).collect())
            .unwrap_or_default();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    pub fn get_edges_by_type(&self, edge_type: &EdgeType) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self
            .edge_type_index
            .get(edge_type)
            .map(|ids| ids.iter().filter_map(|id| self.get_edge(*id)).collect())
            .unwrap_or_default();
        edges.sort_by_key(|e| e.id);
        edges
    }

    pub fn node_count(&self) -> usize {
        self.label_index.values().map(HashSet::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_type_index.values().map(HashSet::len).sum()
    }

    pub fn label_count(&self, label: &Label) -> usize {
        self.label_index.get(label).map_or(0, HashSet::len)
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter_map(Option::as_ref)
    }

    /// Labels in use, sorted
    pub fn labels(&self) -> Vec<&Label> {
        let mut labels: Vec<&Label> = self
            .label_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, _)| label)
            .collect();
        labels.sort();
        labels
    }

    /// Distinct (source label, edge type, target label) triples
    pub fn relationship_patterns(&self) -> BTreeSet<(Label, EdgeType, Label)> {
        self.all_edges()
            .filter_map(|e| {
                let source = self.get_node(e.source)?;
                let target = self.get_node(e.target)?;
                Some((source.label.clone(), e.edge_type.clone(), target.label.clone()))
            })
            .collect()
    }

    /// Declare `property` unique for `label`.
    ///
    /// Returns `Ok(false)` when the constraint already exists. Existing
    /// duplicates make the declaration fail and leave the store unchanged.
    pub fn create_unique_constraint(&mut self, label: impl Into<Label>, property: impl Into<String>) -> GraphResult<bool> {
        let key = PropertyIndexKey::new(label, property);
        if self.constraints.has_index(&key.label, &key.property) {
            return Ok(false);
        }

        let label = key.label.clone();
        let mut index = UniqueIndex::new();
        for node in self.get_nodes_by_label(&label) {
            if let Some(value) = node.get_property(&key.property) {
                if index.insert(value, node.id).is_err() {
                    return Err(GraphError::ConstraintViolation {
                        value: value.to_string(),
                        key,
                    });
                }
            }
        }
        self.constraints.install(key, index);
        Ok(true)
    }

    pub fn constraints(&self) -> Vec<PropertyIndexKey> {
        self.constraints.keys()
    }

    /// Insert a node restored from a snapshot, keeping its id
    pub fn insert_recovered_node(&mut self, node: Node) {
        let id = node.id;
        self.ensure_node_capacity(id);
        self.index_label(&node);
        self.nodes[id.slot()] = Some(node);
        if id.as_u64() >= self.next_node_id {
            self.next_node_id = id.as_u64() + 1;
        }
    }

    /// Insert an edge restored from a snapshot. Its endpoints must exist.
    pub fn insert_recovered_edge(&mut self, edge: Edge) -> GraphResult<()> {
        if !self.has_node(edge.source) {
            return Err(GraphError::InvalidEdgeSource(edge.source));
        }
        if !self.has_node(edge.target) {
            return Err(GraphError::InvalidEdgeTarget(edge.target));
        }
        let id = edge.id;
        self.link_edge(edge);
        if id.as_u64() >= self.next_edge_id {
            self.next_edge_id = id.as_u64() + 1;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn link_edge(&mut self, edge: Edge) {
        let id = edge.id;
        self.ensure_edge_capacity(id);
        self.outgoing[edge.source.slot()].push(id);
        self.incoming[edge.target.slot()].push(id);
        self.edge_keys
            .entry((edge.source, edge.target, edge.edge_type.clone()))
            .or_default()
            .push(id);
        self.edge_type_index
            .entry(edge.edge_type.clone())
            .or_default()
            .insert(id);
        self.edges[id.slot()] = Some(edge);
    }

    fn index_label(&mut self, node: &Node) {
        self.label_index
            .entry(node.label.clone())
            .or_default()
            .insert(node.id);
    }

    /// Reject `properties` if any uniquely indexed value belongs to a node other than `owner`.
    fn check_unique(&self, label: &Label, properties: &PropertyMap, owner: Option<NodeId>) -> GraphResult<()> {
        for property in self.constraints.indexed_properties(label) {
            let Some(value) = properties.get(property) else {
                continue;
            };
            if let Some(existing) = self.constraints.lookup(label, property, value) {
                if Some(existing) != owner {
                    return Err(GraphError::ConstraintViolation {
                        key: PropertyIndexKey::new(label.clone(), property),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn register_unique(&mut self, node: &Node) {
        let properties: Vec<String> = self.constraints.indexed_properties(&node.label).map(str::to_string).collect();
        for property in properties {
            if let Some(value) = node.get_property(&property) {
                // Checked by check_unique beforehand
                let _ = self.constraints.index_insert(&node.label, &property, value, node.id);
            }
        }
    }

    fn reindex_unique(&mut self, label: &Label, id: NodeId, before: &PropertyMap, after: &PropertyMap) {
        let properties: Vec<String> = self.constraints.indexed_properties(label).map(str::to_string).collect();
        for property in properties {
            let old = before.get(&property);
            let new = after.get(&property);
            if old == new {
                continue;
            }
            if let Some(old) = old {
                self.constraints.index_remove(label, &property, old, id);
            }
            if let Some(new) = new {
                let _ = self.constraints.index_insert(label, &property, new, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_create_and_get_node() {
        let mut store = GraphStore::new();
        let id = store.create_node("Trial");
        let node = store.get_node(id).unwrap();
        assert_eq!(node.label.as_str(), "Trial");
        assert_eq!(store.node_count(), 1);
        assert!(store.get_node(NodeId::new(99)).is_none());
    }

    #[test]
    fn test_edge_endpoints_are_validated() {
        let mut store = GraphStore::new();
        let trial = store.create_node("Trial");
        let missing = NodeId::new(42);

        assert_eq!(store.create_edge(trial, missing, "HAS_ARM"), Err(GraphError::InvalidEdgeTarget(missing)));
        assert_eq!(store.create_edge(missing, trial, "HAS_ARM"), Err(GraphError::InvalidEdgeSource(missing)));
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_merge_node_is_idempotent() {
        let mut store = GraphStore::new();
        let row = props(&[("nctId", "NCT1".into()), ("briefTitle", "A".into())]);

        let first = store.merge_node("Trial", "nctId", row.clone()).unwrap();
        let second = store.merge_node("Trial", "nctId", row).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.label_count(&Label::new("Trial")), 1);
    }

    #[test]
    fn test_merge_node_last_write_wins_and_null_removes() {
        let mut store = GraphStore::new();
        store
            .merge_node("Trial", "nctId", props(&[("nctId", "NCT1".into()), ("acronym", "ABC".into()), ("phase", "1".into())]))
            .unwrap();
        let outcome = store
            .merge_node("Trial", "nctId", props(&[("nctId", "NCT1".into()), ("acronym", PropertyValue::Null), ("phase", "2".into())]))
            .unwrap();

        let node = store.get_node(outcome.id).unwrap();
        assert!(node.get_property("acronym").is_none());
        assert_eq!(node.text("phase"), Some("2"));
    }

    #[test]
    fn test_merge_node_rejects_null_key() {
        let mut store = GraphStore::new();
        let err = store.merge_node("Trial", "nctId", props(&[("nctId", PropertyValue::Null)])).unwrap_err();
        assert!(matches!(err, GraphError::NullMergeKey { .. }));
        let err = store.merge_node("Trial", "nctId", PropertyMap::new()).unwrap_err();
        assert!(matches!(err, GraphError::NullMergeKey { .. }));
    }

    #[test]
    fn test_unique_constraint_lifecycle() {
        let mut store = GraphStore::new();
        assert!(store.create_unique_constraint("Trial", "nctId").unwrap());
        assert!(!store.create_unique_constraint("Trial", "nctId").unwrap());
        assert_eq!(store.constraints(), vec![PropertyIndexKey::new("Trial", "nctId")]);

        store.create_node_with_properties("Trial", props(&[("nctId", "NCT1".into())])).unwrap();
        let err = store
            .create_node_with_properties("Trial", props(&[("nctId", "NCT1".into())]))
            .unwrap_err();
        assert!(matches!(err, GraphError::ConstraintViolation { .. }));

        // Merges go through the index
        let found = store.find_node(&Label::new("Trial"), "nctId", &"NCT1".into());
        assert!(found.is_some());
        let outcome = store.merge_node("Trial", "nctId", props(&[("nctId", "NCT1".into())])).unwrap();
        assert_eq!(Some(outcome.id), found);
    }

    #[test]
    fn test_unique_constraint_fails_on_existing_duplicates() {
        let mut store = GraphStore::new();
        store.create_node_with_properties("Condition", props(&[("key", "asthma".into())])).unwrap();
        store.create_node_with_properties("Condition", props(&[("key", "asthma".into())])).unwrap();

        let err = store.create_unique_constraint("Condition", "key").unwrap_err();
        assert!(matches!(err, GraphError::ConstraintViolation { .. }));
        assert!(store.constraints().is_empty());
    }

    #[test]
    fn test_merge_edge_with_discriminant() {
        let mut store = GraphStore::new();
        let org = store.merge_node("Organization", "key", props(&[("key", "acme".into())])).unwrap().id;
        let trial = store.merge_node("Trial", "nctId", props(&[("nctId", "NCT1".into())])).unwrap().id;

        let lead = props(&[("role", "lead_sponsor".into())]);
        let collab = props(&[("role", "collaborator".into())]);
        let e1 = store.merge_edge(org, trial, "SPONSORS", lead.clone(), PropertyMap::new()).unwrap();
        let e2 = store.merge_edge(org, trial, "SPONSORS", lead, PropertyMap::new()).unwrap();
        let e3 = store.merge_edge(org, trial, "SPONSORS", collab, PropertyMap::new()).unwrap();

        assert_eq!(e1, e2);
        assert_ne!(e1, e3);
        assert_eq!(store.get_edges_by_type(&EdgeType::new("SPONSORS")).len(), 2);
        assert_eq!(store.neighbors_in(trial, "SPONSORS").len(), 2);
        assert_eq!(store.neighbors_out(org, "SPONSORS")[0].id, trial);
    }

    #[test]
    fn test_merge_edge_fan_out_and_recovery() {
        let mut store = GraphStore::new();
        let org = store.create_node("Organization");
        let trials: Vec<NodeId> = (0..500).map(|_| store.create_node("Trial")).collect();
        let lead = props(&[("role", "lead_sponsor".into())]);

        for _ in 0..2 {
            for trial in &trials {
                store.merge_edge(org, *trial, "SPONSORS", lead.clone(), PropertyMap::new()).unwrap();
            }
        }
        assert_eq!(store.edge_count(), 500);
        assert_eq!(store.neighbors_out(org, "SPONSORS").len(), 500);

        // Edges restored from a snapshot are found by later merges
        let mut restored = GraphStore::new();
        for node in store.all_nodes() {
            restored.insert_recovered_node(node.clone());
        }
        for edge in store.all_edges() {
            restored.insert_recovered_edge(edge.clone()).unwrap();
        }
        let again = restored
            .merge_edge(org, trials[7], "SPONSORS", lead, PropertyMap::new())
            .unwrap();
        assert_eq!(restored.edge_count(), 500);
        assert_eq!(restored.get_edge(again).unwrap().target, trials[7]);

        restored.clear();
        assert_eq!(restored.edge_count(), 0);
    }

    #[test]
    fn test_merge_edge_updates_attributes() {
        let mut store = GraphStore::new();
        let ae = store.create_node("AdverseEvent");
        let group = store.create_node("AdverseEventGroup");

        store
            .merge_edge(ae, group, "HAS_STAT", PropertyMap::new(), props(&[("numEvents", 1i64.into())]))
            .unwrap();
        let id = store
            .merge_edge(ae, group, "HAS_STAT", PropertyMap::new(), props(&[("numEvents", 4i64.into())]))
            .unwrap();

        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.get_edge(id).unwrap().get_property("numEvents"), Some(&PropertyValue::Integer(4)));
    }

    #[test]
    fn test_schema_views() {
        let mut store = GraphStore::new();
        let trial = store.create_node("Trial");
        let arm = store.create_node("Arm");
        let drug = store.create_node("Intervention");
        store.create_edge(trial, arm, "HAS_ARM").unwrap();
        store.create_edge(arm, drug, "CONTAINS").unwrap();
        store.create_edge(trial, drug, "USES_INTERVENTION").unwrap();

        let labels: Vec<_> = store.labels().into_iter().map(|l| l.as_str().to_string()).collect();
        assert_eq!(labels, vec!["Arm", "Intervention", "Trial"]);

        let patterns = store.relationship_patterns();
        assert_eq!(patterns.len(), 3);
        assert!(patterns.contains(&(Label::new("Arm"), EdgeType::new("CONTAINS"), Label::new("Intervention"))));
    }

    #[test]
    fn test_recovery_preserves_ids() {
        let mut store = GraphStore::new();
        store.insert_recovered_node(Node::new(NodeId::new(5), "Trial"));
        store.insert_recovered_node(Node::new(NodeId::new(2), "Arm"));
        store
            .insert_recovered_edge(Edge::new(EdgeId::new(9), NodeId::new(5), NodeId::new(2), "HAS_ARM"))
            .unwrap();

        let err = store
            .insert_recovered_edge(Edge::new(EdgeId::new(10), NodeId::new(5), NodeId::new(3), "HAS_ARM"))
            .unwrap_err();
        assert_eq!(err, GraphError::InvalidEdgeTarget(NodeId::new(3)));

        // New ids continue after the recovered ones
        let fresh = store.create_node("Trial");
        assert_eq!(fresh, NodeId::new(6));
        let edge = store.create_edge(fresh, NodeId::new(2), "HAS_ARM").unwrap();
        assert_eq!(edge, EdgeId::new(10));
        assert_eq!(store.get_outgoing_edges(NodeId::new(5)).len(), 1);
        assert_eq!(store.get_incoming_edges(NodeId::new(2)).len(), 2);
    }
}
