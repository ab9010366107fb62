//! Schema description for the query-generation prompt
//!
//! Stores report their schema in different shapes: label maps, relationship
//! triples, or plain values. Each entry is kept as one of a closed set of
//! variants and rendered to a fixed text layout; nothing here can fail.

use crate::backend::BackendResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write;

/// One node or relationship description as reported by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaEntry {
    /// Keyed description (`name`, or `startNode`/`type`/`endNode`)
    Map(Map<String, Value>),
    /// `(start, type, end)`
    Tuple(String, String, String),
    /// Anything else, rendered verbatim
    Other(String),
}

impl SchemaEntry {
    pub fn label(name: impl Into<String>) -> Self {
        SchemaEntry::Other(name.into())
    }

    pub fn pattern(start: impl Into<String>, rel_type: impl Into<String>, end: impl Into<String>) -> Self {
        SchemaEntry::Tuple(start.into(), rel_type.into(), end.into())
    }

    /// Classify a raw value from a store response.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => SchemaEntry::Map(map.clone()),
            Value::Array(items) if items.len() == 3 => {
                let parts: Vec<String> = items.iter().map(plain).collect();
                SchemaEntry::Tuple(parts[0].clone(), parts[1].clone(), parts[2].clone())
            }
            other => SchemaEntry::Other(plain(other)),
        }
    }

    fn render_node(&self) -> String {
        match self {
            SchemaEntry::Map(map) => map
                .get("name")
                .map(plain)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            SchemaEntry::Tuple(a, b, c) => format!("({}, {}, {})", a, b, c),
            SchemaEntry::Other(text) => text.clone(),
        }
    }

    fn render_relationship(&self) -> String {
        match self {
            SchemaEntry::Tuple(start, rel_type, end) => format!("({})-[:{}]->({})", start, rel_type, end),
            SchemaEntry::Map(map) => {
                let field = |key: &str| map.get(key).map(plain).unwrap_or_else(|| "None".to_string());
                format!("({})-[:{}]->({})", field("startNode"), field("type"), field("endNode"))
            }
            SchemaEntry::Other(text) => text.clone(),
        }
    }
}

/// Strings without quotes, everything else as JSON
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Live schema of a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub nodes: Vec<SchemaEntry>,
    pub relationships: Vec<SchemaEntry>,
}

impl SchemaResponse {
    /// Build from one introspection record with `nodes` and `relationships` columns.
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let entries = |key: &str| -> Vec<SchemaEntry> {
            match record.get(key) {
                Some(Value::Array(items)) => items.iter().map(SchemaEntry::from_json).collect(),
                _ => Vec::new(),
            }
        };
        Self {
            nodes: entries("nodes"),
            relationships: entries("relationships"),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Node Labels:\n");
        for node in &self.nodes {
            let _ = writeln!(out, "- {}", node.render_node());
        }
        out.push_str("\nRelationships:\n");
        for rel in &self.relationships {
            let _ = writeln!(out, "- {}", rel.render_relationship());
        }
        out
    }
}

/// Render an introspection outcome, degrading to a placeholder.
///
/// `Ok(None)` means the store answered with no schema record at all.
pub fn describe_schema(introspection: BackendResult<Option<SchemaResponse>>) -> String {
    match introspection {
        Err(e) => format!("Schema unavailable: {}", e),
        Ok(None) => "Schema unavailable.".to_string(),
        Ok(Some(schema)) => schema.render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use serde_json::json;

    #[test]
    fn test_canonical_rendering() {
        let schema = SchemaResponse {
            nodes: vec![SchemaEntry::label("Trial"), SchemaEntry::label("Condition")],
            relationships: vec![SchemaEntry::pattern("Trial", "STUDIES", "Condition")],
        };
        assert_eq!(
            describe_schema(Ok(Some(schema))),
            "Node Labels:\n- Trial\n- Condition\n\nRelationships:\n- (Trial)-[:STUDIES]->(Condition)\n"
        );
    }

    #[test]
    fn test_shape_variants() {
        let record = json!({
            "nodes": [{"name": "Trial", "indexes": []}, "Arm", {"other": 1}],
            "relationships": [
                ["Trial", "HAS_ARM", "Arm"],
                {"startNode": "Organization", "type": "SPONSORS", "endNode": "Trial"},
                42
            ]
        });
        let schema = SchemaResponse::from_record(record.as_object().unwrap());
        let text = schema.render();

        assert!(text.contains("- Trial\n"));
        assert!(text.contains("- Arm\n"));
        assert!(text.contains("- {\"other\":1}\n"));
        assert!(text.contains("- (Trial)-[:HAS_ARM]->(Arm)\n"));
        assert!(text.contains("- (Organization)-[:SPONSORS]->(Trial)\n"));
        assert!(text.contains("- 42\n"));
    }

    #[test]
    fn test_degraded_outcomes() {
        assert_eq!(describe_schema(Ok(None)), "Schema unavailable.");
        let err = BackendError::Connection("refused".to_string());
        assert_eq!(describe_schema(Err(err)), "Schema unavailable: Connection error: refused");
    }

    #[test]
    fn test_missing_columns_give_empty_sections() {
        let schema = SchemaResponse::from_record(&Map::new());
        assert_eq!(schema.render(), "Node Labels:\n\nRelationships:\n");
    }
}
