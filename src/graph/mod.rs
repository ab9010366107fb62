//! Embedded property graph
//!
//! - Nodes with one label and a property map
//! - Directed, typed edges with properties; several edges may join the same pair
//! - Key-based merge for nodes and discriminant-based merge for edges
//! - Unique constraints backed by hash indexes

pub mod edge;
pub mod node;
pub mod property;
pub mod store;
pub mod types;

pub use edge::Edge;
pub use node::Node;
pub use property::{properties_from_json, PropertyMap, PropertyValue};
pub use store::{GraphError, GraphResult, GraphStore, MergeOutcome};
pub use types::{EdgeId, EdgeType, Label, NodeId};
