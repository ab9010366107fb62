//! Uniqueness constraints declared before any load

use super::plan::node_identity;
use super::LoadResult;
use crate::backend::GraphBackend;
use crate::ingest::RecordKind;
use std::fmt;
use tracing::info;

/// A named uniqueness constraint on one node label's merge key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: String,
    pub label: &'static str,
    pub property: &'static str,
}

impl UniqueConstraint {
    pub fn new(label: &'static str, property: &'static str) -> Self {
        Self {
            name: format!("{}_{}_unique", snake_case(label), snake_case(property)),
            label,
            property,
        }
    }

    /// Idempotent Cypher declaration
    pub fn to_cypher(&self) -> String {
        format!(
            "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            self.name, self.label, self.property
        )
    }
}

impl fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}.{})", self.name, self.label, self.property)
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// One constraint per node kind, on its merge key
pub fn unique_constraints() -> Vec<UniqueConstraint> {
    RecordKind::ALL
        .iter()
        .filter_map(|kind| node_identity(*kind))
        .map(|(label, key)| UniqueConstraint::new(label, key))
        .collect()
}

/// Outcome of a constraint pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSummary {
    pub created: usize,
    pub existing: usize,
}

/// Declare every constraint. Safe to run any number of times.
///
/// The first failure aborts the pass: loading without constraints would
/// give up the one-node-per-key guarantee.
pub async fn initialize_constraints(backend: &dyn GraphBackend) -> LoadResult<ConstraintSummary> {
    info!("Creating constraints...");
    let mut summary = ConstraintSummary::default();
    for constraint in unique_constraints() {
        if backend.ensure_unique_constraint(&constraint).await? {
            summary.created += 1;
        } else {
            summary.existing += 1;
        }
    }
    info!(
        "Constraints ready ({} created, {} already present)",
        summary.created, summary.existing
    );
    Ok(summary)
}
