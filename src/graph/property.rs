//! Property values carried by nodes and edges
//!
//! Loader rows arrive as JSON, so values convert losslessly from and to
//! `serde_json::Value`. Nested objects are kept as maps; the loader only
//! produces them for list-valued columns (phases, other names).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
    Null,
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "String",
            PropertyValue::Integer(_) => "Integer",
            PropertyValue::Float(_) => "Float",
            PropertyValue::Boolean(_) => "Boolean",
            PropertyValue::Array(_) => "Array",
            PropertyValue::Map(_) => "Map",
            PropertyValue::Null => "Null",
        }
    }

    /// Canonical text used as a unique-index key.
    ///
    /// Strings index as themselves so `"NCT1"` and a lookup by `"NCT1"`
    /// agree; other scalars use their JSON rendering. Null has no key.
    pub fn index_key(&self) -> Option<String> {
        match self {
            PropertyValue::Null => None,
            PropertyValue::String(s) => Some(s.clone()),
            other => Some(other.to_json().to_string()),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Integer(i),
                None => n.as_f64().map(PropertyValue::Float).unwrap_or(PropertyValue::Null),
            },
            Value::String(s) => PropertyValue::String(s.clone()),
            Value::Array(items) => PropertyValue::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => PropertyValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Integer(i) => Value::from(*i),
            PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PropertyValue::Boolean(b) => Value::Bool(*b),
            PropertyValue::Array(arr) => Value::Array(arr.iter().map(|v| v.to_json()).collect()),
            PropertyValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            PropertyValue::Null => Value::Null,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "\"{}\"", s),
            PropertyValue::Null => write!(f, "null"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(arr: Vec<PropertyValue>) -> Self {
        PropertyValue::Array(arr)
    }
}

/// Properties of a node or edge, ordered by name
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Convert a JSON object into properties, keeping nulls.
pub fn properties_from_json(row: &serde_json::Map<String, Value>) -> PropertyMap {
    row.iter()
        .map(|(k, v)| (k.clone(), PropertyValue::from_json(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let value = json!({"nctId": "NCT1", "enrollmentCount": 120, "lat": 1.5, "phases": ["PHASE3"], "x": null});
        let prop = PropertyValue::from_json(&value);
        let PropertyValue::Map(map) = &prop else {
            panic!("expected map");
        };
        assert_eq!(map["nctId"].as_string(), Some("NCT1"));
        assert_eq!(map["enrollmentCount"].as_integer(), Some(120));
        assert_eq!(map["lat"].as_float(), Some(1.5));
        assert_eq!(map["phases"].as_array().map(|a| a.len()), Some(1));
        assert!(map["x"].is_null());
        assert_eq!(prop.to_json(), value);
    }

    #[test]
    fn test_index_key() {
        assert_eq!(PropertyValue::from("NCT1").index_key().as_deref(), Some("NCT1"));
        assert_eq!(PropertyValue::Integer(5).index_key().as_deref(), Some("5"));
        assert_eq!(PropertyValue::Null.index_key(), None);
        // A string "5" and an integer 5 are different keys' sources but share text
        assert_eq!(PropertyValue::from("5").index_key(), PropertyValue::Integer(5).index_key());
    }

    #[test]
    fn test_display_and_widening() {
        assert_eq!(PropertyValue::from("a").to_string(), "\"a\"");
        assert_eq!(PropertyValue::from(vec![PropertyValue::Integer(1)]).to_string(), "[1]");
        assert_eq!(PropertyValue::Integer(3).as_float(), Some(3.0));
        assert_eq!(PropertyValue::Boolean(true).type_name(), "Boolean");
    }
}
