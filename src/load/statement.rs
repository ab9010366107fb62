//! Parameterized upsert statements
//!
//! A statement describes how one batch of rows of a single kind merges into
//! the graph. The embedded backend interprets it directly; remote backends
//! send its Cypher rendering with the batch bound to `$rows`.

use std::fmt::Write;

/// Merge rows as nodes of `label` keyed on the `key` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeUpsert {
    pub label: &'static str,
    pub key: &'static str,
}

/// How a row column resolves to an existing node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub label: &'static str,
    /// Merge key property on the node
    pub key: &'static str,
    /// Row column holding the key value
    pub column: &'static str,
}

impl Endpoint {
    pub const fn new(label: &'static str, key: &'static str, column: &'static str) -> Self {
        Self { label, key, column }
    }
}

/// Merge one edge per row between two existing nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeUpsert {
    pub rel_type: &'static str,
    pub source: Endpoint,
    pub target: Endpoint,
    /// Columns that tell parallel edges between the same pair apart
    pub discriminant: &'static [&'static str],
    /// Columns stored on the edge
    pub properties: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatement {
    Node(NodeUpsert),
    Edge(EdgeUpsert),
}

impl UpsertStatement {
    pub const fn node(label: &'static str, key: &'static str) -> Self {
        UpsertStatement::Node(NodeUpsert { label, key })
    }

    pub const fn edge(rel_type: &'static str, source: Endpoint, target: Endpoint) -> Self {
        UpsertStatement::Edge(EdgeUpsert {
            rel_type,
            source,
            target,
            discriminant: &[],
            properties: &[],
        })
    }

    /// Columns a row must carry for the statement to do anything
    pub fn key_columns(&self) -> Vec<&'static str> {
        match self {
            UpsertStatement::Node(node) => vec![node.key],
            UpsertStatement::Edge(edge) => {
                let mut columns = vec![edge.source.column, edge.target.column];
                columns.extend(edge.discriminant.iter().copied());
                columns
            }
        }
    }

    /// Cypher text expecting the batch as `$rows`.
    ///
    /// Rows whose endpoints do not match existing nodes produce nothing,
    /// since the `MATCH` clauses filter them out before the `MERGE`.
    pub fn to_cypher(&self) -> String {
        match self {
            UpsertStatement::Node(node) => format!(
                "UNWIND $rows AS row\nMERGE (n:{} {{{}: row.{}}})\nSET n += row",
                node.label, node.key, node.key
            ),
            UpsertStatement::Edge(edge) => {
                let mut cypher = String::from("UNWIND $rows AS row\n");
                let _ = writeln!(
                    cypher,
                    "MATCH (a:{} {{{}: row.{}}})",
                    edge.source.label, edge.source.key, edge.source.column
                );
                let _ = writeln!(
                    cypher,
                    "MATCH (b:{} {{{}: row.{}}})",
                    edge.target.label, edge.target.key, edge.target.column
                );
                let discriminant = edge
                    .discriminant
                    .iter()
                    .map(|c| format!("{}: row.{}", c, c))
                    .collect::<Vec<_>>()
                    .join(", ");
                if discriminant.is_empty() {
                    let _ = write!(cypher, "MERGE (a)-[r:{}]->(b)", edge.rel_type);
                } else {
                    let _ = write!(cypher, "MERGE (a)-[r:{} {{{}}}]->(b)", edge.rel_type, discriminant);
                }
                if !edge.properties.is_empty() {
                    let assignments = edge
                        .properties
                        .iter()
                        .map(|c| format!("r.{} = row.{}", c, c))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = write!(cypher, "\nSET {}", assignments);
                }
                cypher
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_cypher() {
        let stmt = UpsertStatement::node("Trial", "nctId");
        assert_eq!(
            stmt.to_cypher(),
            "UNWIND $rows AS row\nMERGE (n:Trial {nctId: row.nctId})\nSET n += row"
        );
        assert_eq!(stmt.key_columns(), vec!["nctId"]);
    }

    #[test]
    fn test_edge_cypher_with_discriminant_and_properties() {
        let stmt = UpsertStatement::Edge(EdgeUpsert {
            rel_type: "ACHIEVED",
            source: Endpoint::new("ParticipantFlowGroup", "flowGroupId", "flowGroupId"),
            target: Endpoint::new("Trial", "nctId", "nctId"),
            discriminant: &["periodTitle", "milestoneType"],
            properties: &["numSubjects"],
        });
        assert_eq!(
            stmt.to_cypher(),
            "UNWIND $rows AS row\n\
             MATCH (a:ParticipantFlowGroup {flowGroupId: row.flowGroupId})\n\
             MATCH (b:Trial {nctId: row.nctId})\n\
             MERGE (a)-[r:ACHIEVED {periodTitle: row.periodTitle, milestoneType: row.milestoneType}]->(b)\n\
             SET r.numSubjects = row.numSubjects"
        );
        assert_eq!(stmt.key_columns(), vec!["flowGroupId", "nctId", "periodTitle", "milestoneType"]);
    }

    #[test]
    fn test_plain_edge_cypher() {
        let stmt = UpsertStatement::edge(
            "HAS_ARM",
            Endpoint::new("Trial", "nctId", "nctId"),
            Endpoint::new("Arm", "armId", "targetId"),
        );
        assert!(stmt.to_cypher().ends_with("MERGE (a)-[r:HAS_ARM]->(b)"));
        assert!(stmt.to_cypher().contains("MATCH (b:Arm {armId: row.targetId})"));
    }
}
