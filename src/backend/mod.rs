//! Graph store backends
//!
//! Everything that writes to or reads from a graph store goes through
//! [`GraphBackend`]. Two implementations exist:
//! - [`EmbeddedBackend`]: the in-process store, persisted as a snapshot file
//! - [`HttpBackend`]: a Neo4j-compatible server over its transactional HTTP endpoint

pub mod embedded;
pub mod http;

use crate::graph::GraphError;
use crate::load::constraints::UniqueConstraint;
use crate::load::statement::UpsertStatement;
use crate::nlq::SchemaResponse;
use crate::persistence::SnapshotError;
use crate::portfolio::PortfolioRow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use embedded::EmbeddedBackend;
pub use http::{HttpBackend, HttpConfig};

/// One loader row or query record: column name to value
pub type Row = serde_json::Map<String, Value>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Query error: {0}")]
    Query(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Unsupported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Tabular result of a read query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub records: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records keyed by column name
    pub fn rows(&self) -> Vec<Row> {
        self.records
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(record.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// What one upsert batch did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows sent to the store
    pub written: u64,
    /// Edge rows whose endpoints were not found (known only to the embedded store)
    pub unmatched: u64,
}

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Short name for logs and errors
    fn name(&self) -> &'static str;

    /// Fail fast when the store is unreachable
    async fn ping(&self) -> BackendResult<()>;

    /// Create the constraint unless it already exists. Returns whether it was created,
    /// when the store can tell.
    async fn ensure_unique_constraint(&self, constraint: &UniqueConstraint) -> BackendResult<bool>;

    /// Apply `statement` to one batch of cleaned rows
    async fn upsert(&self, statement: &UpsertStatement, rows: &[Row]) -> BackendResult<UpsertOutcome>;

    /// Run a query that has already been vetted as read-only
    async fn read_query(&self, query: &str) -> BackendResult<QueryResult>;

    /// Live schema, or `None` when the store reports nothing
    async fn schema(&self) -> BackendResult<Option<SchemaResponse>>;

    /// Flat portfolio rows for the intervention with dedupe key `key`
    async fn intervention_portfolio(&self, key: &str) -> BackendResult<Vec<PortfolioRow>>;

    /// Make prior writes durable
    async fn persist(&self) -> BackendResult<()>;
}
