//! Guard rails for generated graph queries
//!
//! Text-to-query translation happens elsewhere; this module only accepts its
//! output. A generated query is unwrapped from any markdown fence, scanned
//! for mutating keywords and executed read-only, or rejected without ever
//! reaching the store.

pub mod schema;

use crate::backend::{BackendError, GraphBackend, QueryResult};
use thiserror::Error;
use tracing::{info, warn};

pub use schema::{describe_schema, SchemaEntry, SchemaResponse};

/// Keywords that make a query mutating
pub const MUTATING_KEYWORDS: [&str; 7] = ["CREATE", "MERGE", "DELETE", "DETACH", "DROP", "SET", "REMOVE"];

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("Query rejected: contains mutating keyword {0}")]
    UnsafeQuery(String),

    #[error("Query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type NlqResult<T> = Result<T, NlqError>;

/// Pull the query out of a response that may wrap it in a fenced code block.
///
/// The first fenced block wins and its language tag is dropped. Without a
/// fence the trimmed text is returned as is.
pub fn extract_cypher(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let code_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
        let body = &after_fence[code_start..];
        let end = body.find("```").unwrap_or(body.len());
        return body[..end].trim().to_string();
    }

    trimmed.to_string()
}

/// First mutating keyword appearing as a whole word, case-insensitive
pub fn find_mutating_keyword(query: &str) -> Option<&'static str> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            MUTATING_KEYWORDS
                .iter()
                .copied()
                .find(|kw| word.eq_ignore_ascii_case(kw))
        })
}

pub fn is_safe_query(query: &str) -> bool {
    find_mutating_keyword(query).is_none()
}

/// Reject `query` if it could mutate the store.
pub fn ensure_read_only(query: &str) -> NlqResult<()> {
    if query.trim().is_empty() {
        return Err(NlqError::EmptyQuery);
    }
    match find_mutating_keyword(query) {
        Some(keyword) => Err(NlqError::UnsafeQuery(keyword.to_string())),
        None => Ok(()),
    }
}

/// Unwrap, vet and run a generated query.
pub async fn run_read_only(backend: &dyn GraphBackend, generated: &str) -> NlqResult<QueryResult> {
    let query = extract_cypher(generated);
    if let Err(e) = ensure_read_only(&query) {
        warn!("Rejected generated query: {}", e);
        return Err(e);
    }
    info!("Running read-only query: {}", query);
    Ok(backend.read_query(&query).await?)
}
