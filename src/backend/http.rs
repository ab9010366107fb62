//! Neo4j-compatible store over the transactional HTTP endpoint
//!
//! Every call is one auto-committed transaction posted to
//! `{url}/db/{database}/tx/commit`, so a failed upsert batch leaves nothing
//! behind.

use super::{BackendError, BackendResult, GraphBackend, QueryResult, Row, UpsertOutcome};
use crate::load::constraints::UniqueConstraint;
use crate::load::statement::UpsertStatement;
use crate::nlq::SchemaResponse;
use crate::portfolio::{PortfolioRow, PORTFOLIO_QUERY};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Schema introspection projected to label names
pub const SCHEMA_QUERY: &str = "\
CALL db.schema.visualization() YIELD nodes, relationships
RETURN [n IN nodes | labels(n)[0]] AS nodes,
       [r IN relationships | [labels(startNode(r))[0], type(r), labels(endNode(r))[0]]] AS relationships";

/// Connection settings for [`HttpBackend`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl TxResponse {
    fn into_result(self) -> BackendResult<QueryResult> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(BackendError::Query(format!("{}: {}", error.code, error.message)));
        }
        Ok(self
            .results
            .into_iter()
            .next()
            .map(|result| QueryResult {
                columns: result.columns,
                records: result.data.into_iter().map(|d| d.row).collect(),
            })
            .unwrap_or_default())
    }
}

pub struct HttpBackend {
    config: HttpConfig,
    http_client: Client,
}

impl HttpBackend {
    pub fn new(config: HttpConfig) -> Self {
        let config = HttpConfig {
            url: config.url.trim_end_matches('/').to_string(),
            ..config
        };
        Self {
            config,
            http_client: Client::new(),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.config.url, self.config.database)
    }

    /// Run one statement in its own transaction
    async fn run(&self, statement: &str, parameters: Value) -> BackendResult<QueryResult> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let response = self
            .http_client
            .post(self.commit_url())
            .basic_auth(&self.config.username, self.config.password.as_ref())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::Connection(format!(
                "Authentication failed for user {}",
                self.config.username
            )));
        }
        if !status.is_success() {
            return Err(BackendError::Connection(format!("{} returned {}", self.commit_url(), status)));
        }

        let tx: TxResponse = response.json().await?;
        tx.into_result()
    }
}

#[async_trait]
impl GraphBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn ping(&self) -> BackendResult<()> {
        self.run("RETURN 1", json!({})).await.map_err(|e| match e {
            BackendError::Http(e) => BackendError::Connection(format!("{}: {}", self.config.url, e)),
            other => other,
        })?;
        Ok(())
    }

    async fn ensure_unique_constraint(&self, constraint: &UniqueConstraint) -> BackendResult<bool> {
        debug!("Declaring {}", constraint);
        self.run(&constraint.to_cypher(), json!({})).await?;
        // IF NOT EXISTS does not report whether anything was created
        Ok(true)
    }

    async fn upsert(&self, statement: &UpsertStatement, rows: &[Row]) -> BackendResult<UpsertOutcome> {
        self.run(&statement.to_cypher(), json!({ "rows": rows })).await?;
        Ok(UpsertOutcome {
            written: rows.len() as u64,
            unmatched: 0,
        })
    }

    async fn read_query(&self, query: &str) -> BackendResult<QueryResult> {
        self.run(query, json!({})).await
    }

    async fn schema(&self) -> BackendResult<Option<SchemaResponse>> {
        let result = self.run(SCHEMA_QUERY, json!({})).await?;
        Ok(result.rows().first().map(SchemaResponse::from_record))
    }

    async fn intervention_portfolio(&self, key: &str) -> BackendResult<Vec<PortfolioRow>> {
        let result = self.run(PORTFOLIO_QUERY, json!({ "key": key })).await?;
        Ok(result.rows().iter().map(PortfolioRow::from_record).collect())
    }

    async fn persist(&self) -> BackendResult<()> {
        Ok(())
    }
}
