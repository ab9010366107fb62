//! In-process backend over [`GraphStore`]
//!
//! The store sits behind an async read-write lock. Each upsert batch is
//! validated up front and then applied under one write lock, so other
//! batches never observe half of it. When opened with a snapshot path the
//! graph is restored from it and [`GraphBackend::persist`] rewrites it.

use super::{BackendError, BackendResult, GraphBackend, QueryResult, Row, UpsertOutcome};
use crate::graph::{properties_from_json, GraphError, GraphStore, Label, Node, NodeId, PropertyMap, PropertyValue};
use crate::load::constraints::UniqueConstraint;
use crate::load::statement::{EdgeUpsert, Endpoint, NodeUpsert, UpsertStatement};
use crate::nlq::{SchemaEntry, SchemaResponse};
use crate::persistence::{load_snapshot, save_snapshot};
use crate::portfolio::PortfolioRow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct EmbeddedBackend {
    store: Arc<RwLock<GraphStore>>,
    snapshot: Option<PathBuf>,
}

impl EmbeddedBackend {
    /// Volatile store, nothing is persisted
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(RwLock::new(GraphStore::new())),
            snapshot: None,
        }
    }

    /// Restore from `path` (if it exists) and persist back to it.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        info!("Opening embedded graph at: {}", path.display());
        let store = load_snapshot(path)?;
        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Shared handle to the underlying store
    pub fn store(&self) -> Arc<RwLock<GraphStore>> {
        Arc::clone(&self.store)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }
}

fn column_value(row: &Row, column: &str) -> PropertyValue {
    row.get(column).map(PropertyValue::from_json).unwrap_or(PropertyValue::Null)
}

fn columns(row: &Row, names: &[&str]) -> PropertyMap {
    names
        .iter()
        .map(|name| (name.to_string(), column_value(row, name)))
        .collect()
}

fn resolve(store: &GraphStore, endpoint: &Endpoint, row: &Row) -> Option<NodeId> {
    let label = Label::new(endpoint.label);
    store.find_node(&label, endpoint.key, &column_value(row, endpoint.column))
}

fn apply_nodes(store: &mut GraphStore, node: &NodeUpsert, rows: &[Row]) -> BackendResult<UpsertOutcome> {
    if let Some(row) = rows.iter().find(|row| column_value(row, node.key).is_null()) {
        debug!("Rejected {} batch, first offending row: {:?}", node.label, row);
        return Err(BackendError::Graph(GraphError::NullMergeKey {
            label: Label::new(node.label),
            property: node.key.to_string(),
        }));
    }

    for row in rows {
        store.merge_node(node.label, node.key, properties_from_json(row))?;
    }
    Ok(UpsertOutcome {
        written: rows.len() as u64,
        unmatched: 0,
    })
}

fn apply_edges(store: &mut GraphStore, edge: &EdgeUpsert, rows: &[Row]) -> BackendResult<UpsertOutcome> {
    let mut outcome = UpsertOutcome::default();
    for row in rows {
        let (Some(source), Some(target)) = (resolve(store, &edge.source, row), resolve(store, &edge.target, row)) else {
            outcome.unmatched += 1;
            continue;
        };
        store.merge_edge(
            source,
            target,
            edge.rel_type,
            columns(row, edge.discriminant),
            columns(row, edge.properties),
        )?;
        outcome.written += 1;
    }
    if outcome.unmatched > 0 {
        debug!("{}: {} rows without both endpoints", edge.rel_type, outcome.unmatched);
    }
    Ok(outcome)
}

fn text(node: &Node, key: &str) -> Option<String> {
    node.text(key).map(str::to_string)
}

/// Property values of joined nodes; a single null when nothing joined
fn names(nodes: Vec<&Node>, key: &str) -> Vec<Option<String>> {
    if nodes.is_empty() {
        return vec![None];
    }
    nodes.into_iter().map(|n| text(n, key)).collect()
}

/// Flatten one trial into its portfolio rows
fn trial_rows(store: &GraphStore, trial: &Node) -> Vec<PortfolioRow> {
    let conditions = names(store.neighbors_out(trial.id, "STUDIES"), "name");
    let sponsors = names(store.neighbors_in(trial.id, "SPONSORS"), "name");
    let countries = names(store.neighbors_out(trial.id, "HAS_SITE"), "country");
    let arms = names(store.neighbors_out(trial.id, "HAS_ARM"), "label");

    let base = PortfolioRow {
        nct_id: text(trial, "nctId").unwrap_or_default(),
        phases: trial
            .get_property("phases")
            .and_then(PropertyValue::as_array)
            .map(|items| items.iter().filter_map(|p| p.as_string().map(str::to_string)).collect())
            .unwrap_or_default(),
        study_type: text(trial, "studyType"),
        allocation: text(trial, "allocation"),
        masking: text(trial, "masking"),
        status: text(trial, "overallStatus"),
        enrollment: trial.get_property("enrollmentCount").and_then(PropertyValue::as_integer),
        ..Default::default()
    };

    let mut rows = Vec::with_capacity(conditions.len() * sponsors.len() * countries.len() * arms.len());
    for condition in &conditions {
        for sponsor in &sponsors {
            for country in &countries {
                for arm in &arms {
                    rows.push(PortfolioRow {
                        condition: condition.clone(),
                        sponsor: sponsor.clone(),
                        country: country.clone(),
                        arm_label: arm.clone(),
                        ..base.clone()
                    });
                }
            }
        }
    }
    rows
}

#[async_trait]
impl GraphBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn ensure_unique_constraint(&self, constraint: &UniqueConstraint) -> BackendResult<bool> {
        let mut store = self.store.write().await;
        Ok(store.create_unique_constraint(constraint.label, constraint.property)?)
    }

    async fn upsert(&self, statement: &UpsertStatement, rows: &[Row]) -> BackendResult<UpsertOutcome> {
        let mut store = self.store.write().await;
        match statement {
            UpsertStatement::Node(node) => apply_nodes(&mut store, node, rows),
            UpsertStatement::Edge(edge) => apply_edges(&mut store, edge, rows),
        }
    }

    async fn read_query(&self, _query: &str) -> BackendResult<QueryResult> {
        Err(BackendError::Unsupported {
            backend: self.name(),
            operation: "Cypher read queries",
        })
    }

    async fn schema(&self) -> BackendResult<Option<SchemaResponse>> {
        let store = self.store.read().await;
        let labels = store.labels();
        if labels.is_empty() {
            return Ok(None);
        }
        let nodes = labels.into_iter().map(|l| SchemaEntry::label(l.as_str())).collect();
        let relationships = store
            .relationship_patterns()
            .into_iter()
            .map(|(start, rel_type, end)| SchemaEntry::pattern(start.as_str(), rel_type.as_str(), end.as_str()))
            .collect();
        Ok(Some(SchemaResponse { nodes, relationships }))
    }

    async fn intervention_portfolio(&self, key: &str) -> BackendResult<Vec<PortfolioRow>> {
        let store = self.store.read().await;
        let Some(intervention) = store.find_node(&Label::new("Intervention"), "key", &PropertyValue::from(key)) else {
            return Ok(Vec::new());
        };

        let trial_label = Label::new("Trial");
        let mut trials: Vec<&Node> = store
            .neighbors_in(intervention, "USES_INTERVENTION")
            .into_iter()
            .filter(|n| n.has_label(&trial_label))
            .collect();
        trials.sort_by(|a, b| a.text("nctId").cmp(&b.text("nctId")));
        trials.dedup_by_key(|n| n.id);

        Ok(trials.into_iter().flat_map(|t| trial_rows(&store, t)).collect())
    }

    async fn persist(&self) -> BackendResult<()> {
        if let Some(path) = &self.snapshot {
            let store = self.store.read().await;
            save_snapshot(&store, path)?;
        }
        Ok(())
    }
}
