//! Trialgraph
//!
//! Turns a dump of nested clinical-trial registry documents into a
//! deduplicated property graph of trials, organizations, conditions,
//! interventions, sites, outcomes, results, eligibility criteria and their
//! relationships.
//!
//! # Architecture
//!
//! Two decoupled phases exchange data through one JSON Lines file per record kind:
//!
//! - [`ingest`]: streams the dump (JSONL or a top-level array, optionally gzip),
//!   flattens each document into typed records and appends them to per-kind
//!   files, dead-lettering documents that cannot be extracted.
//! - [`load`]: reads those files back, cleans rows, and merges them into a
//!   graph store in batches, nodes before relationships, so reruns are idempotent.
//!
//! Stores sit behind [`backend::GraphBackend`]: the in-process [`graph`] store
//! (persisted as a compressed snapshot) or a Neo4j-compatible HTTP server.
//! [`portfolio`] and [`nlq`] are the read side.
//!
//! ## Example Usage
//!
//! ```rust
//! use trialgraph::graph::{GraphStore, PropertyMap, PropertyValue};
//!
//! let mut store = GraphStore::new();
//! let mut props = PropertyMap::new();
//! props.insert("nctId".to_string(), PropertyValue::from("NCT00000001"));
//! props.insert("overallStatus".to_string(), PropertyValue::from("COMPLETED"));
//!
//! let first = store.merge_node("Trial", "nctId", props.clone()).unwrap();
//! let again = store.merge_node("Trial", "nctId", props).unwrap();
//!
//! assert!(first.created);
//! assert!(!again.created);
//! assert_eq!(store.node_count(), 1);
//! ```

pub mod backend;
pub mod config;
pub mod graph;
pub mod index;
pub mod ingest;
pub mod load;
pub mod nlq;
pub mod persistence;
pub mod portfolio;

pub use backend::{BackendError, BackendResult, EmbeddedBackend, GraphBackend, HttpBackend, HttpConfig, QueryResult, Row};
pub use config::{Config, ConfigError, StoreConfig};
pub use graph::{Edge, EdgeId, EdgeType, GraphError, GraphResult, GraphStore, Label, Node, NodeId, PropertyMap, PropertyValue};
pub use ingest::{extract_file, DocumentStream, ExtractOptions, ExtractionContext, ExtractionSummary, RecordKind};
pub use load::{initialize_constraints, load_directory, LoadError, LoadOptions, LoadSummary};
pub use nlq::{describe_schema, ensure_read_only, run_read_only, NlqError};
pub use portfolio::{intervention_portfolio, Portfolio, PortfolioMetrics, PortfolioRow};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
