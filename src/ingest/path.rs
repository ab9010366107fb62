//! Dotted-path access over loosely-typed documents
//!
//! Every lookup is total: a missing segment, an explicit `null`, or a
//! non-map intermediate value all resolve to "absent" instead of failing.
//! Only the collection helpers report a shape error, and only when a value
//! is present but cannot be read as a list.

use serde_json::Value;
use thiserror::Error;

/// A present value had a shape the caller cannot work with
#[derive(Error, Debug, Clone, PartialEq)]
#[error("expected {expected} at '{path}'")]
pub struct ShapeError {
    pub path: String,
    pub expected: &'static str,
}

impl ShapeError {
    pub fn new(path: impl Into<String>, expected: &'static str) -> Self {
        Self {
            path: path.into(),
            expected,
        }
    }
}

/// Resolve `path` (segments separated by `.`) starting at `doc`.
///
/// Returns `None` when any segment is absent, when an intermediate value is
/// not an object, or when the final value is `null`.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Resolve `path`, falling back to `default` when absent.
pub fn lookup_or<'a>(doc: &'a Value, path: &str, default: &'a Value) -> &'a Value {
    lookup(doc, path).unwrap_or(default)
}

/// Read a scalar as text. Numbers and booleans are rendered; structured
/// values read as absent.
pub fn text(doc: &Value, path: &str) -> Option<String> {
    lookup(doc, path).and_then(scalar_text)
}

/// Text form of a scalar value.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read an integer; numeric strings such as `"120"` are accepted.
pub fn integer(doc: &Value, path: &str) -> Option<i64> {
    match lookup(doc, path)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a boolean.
pub fn flag(doc: &Value, path: &str) -> Option<bool> {
    lookup(doc, path).and_then(Value::as_bool)
}

/// Read a list. Absent or `null` is an empty list; any other non-array
/// value is a shape error.
pub fn list<'a>(doc: &'a Value, path: &str) -> Result<&'a [Value], ShapeError> {
    match lookup(doc, path) {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ShapeError::new(path, "a list")),
    }
}

/// Read a list of objects. `null` entries are skipped; any other
/// non-object entry is a shape error.
pub fn object_list<'a>(doc: &'a Value, path: &str) -> Result<Vec<&'a Value>, ShapeError> {
    list(doc, path)?
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| expect_object(item, path))
        .collect()
}

/// Read a list of scalars as text, skipping nulls and structured entries.
pub fn text_list(doc: &Value, path: &str) -> Vec<String> {
    match lookup(doc, path) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Require a list element to be an object.
pub fn expect_object<'a>(item: &'a Value, path: &str) -> Result<&'a Value, ShapeError> {
    if item.is_object() {
        Ok(item)
    } else {
        Err(ShapeError::new(path, "an object"))
    }
}
