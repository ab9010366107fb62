//! Batch Loader
//!
//! For each kind in plan order: read the kind's JSON Lines file, clean every
//! row, split into fixed-size batches, drop rows missing a required key and
//! send each non-empty batch as one upsert. Batches of a kind run with
//! bounded concurrency; the next kind starts only when all batches of the
//! current one have finished. A failed batch is logged and counted, never
//! retried.

use super::plan::{load_plan, KindPlan};
use super::{LoadError, LoadResult};
use crate::backend::{GraphBackend, Row};
use crate::ingest::normalize::dedupe_key;
use crate::ingest::RecordKind;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    /// Batches of one kind in flight at once
    pub concurrency: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            concurrency: 4,
        }
    }
}

/// Counters for one kind
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KindLoadSummary {
    pub kind: RecordKind,
    pub rows_read: u64,
    /// Unparsable lines plus rows missing a required key
    pub rows_dropped: u64,
    pub rows_loaded: u64,
    pub batches_loaded: u64,
    pub batches_skipped: u64,
    pub batches_failed: u64,
    /// Edge rows whose endpoints were absent, when the store reports it
    pub unmatched: u64,
    pub elapsed_secs: f64,
}

impl KindLoadSummary {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            rows_read: 0,
            rows_dropped: 0,
            rows_loaded: 0,
            batches_loaded: 0,
            batches_skipped: 0,
            batches_failed: 0,
            unmatched: 0,
            elapsed_secs: 0.0,
        }
    }
}

/// Counters for a whole load
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LoadSummary {
    pub kinds: Vec<KindLoadSummary>,
    pub elapsed_secs: f64,
}

impl LoadSummary {
    pub fn kind(&self, kind: RecordKind) -> Option<&KindLoadSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    pub fn rows_read(&self) -> u64 {
        self.kinds.iter().map(|k| k.rows_read).sum()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.kinds.iter().map(|k| k.rows_loaded).sum()
    }

    pub fn rows_dropped(&self) -> u64 {
        self.kinds.iter().map(|k| k.rows_dropped).sum()
    }

    pub fn batches_failed(&self) -> u64 {
        self.kinds.iter().map(|k| k.batches_failed).sum()
    }
}

/// Read every row of a JSON Lines file.
///
/// A missing file holds no rows. Lines that are not JSON objects are
/// skipped with a warning and reported in the second value.
pub fn read_rows(path: &Path) -> LoadResult<(Vec<Row>, u64)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} not found, nothing to load", path.display());
            return Ok((Vec::new(), 0));
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut reader = BufReader::new(file);
    let mut rows = Vec::new();
    let mut dropped = 0;
    let mut line = Vec::new();
    let mut line_no = 0usize;
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        line_no += 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Bytes that are not UTF-8 fail here as a parse error
        match serde_json::from_slice::<Value>(&line) {
            Ok(Value::Object(row)) => rows.push(row),
            Ok(_) => {
                warn!("{}:{}: not a JSON object, skipped", path.display(), line_no);
                dropped += 1;
            }
            Err(e) => {
                warn!("{}:{}: {}, skipped", path.display(), line_no, e);
                dropped += 1;
            }
        }
    }
    Ok((rows, dropped))
}

fn clean_value(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else if trimmed.len() == s.len() {
                Value::String(s)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        other => other,
    }
}

/// Normalize a kind's rows before batching.
///
/// Every row gets every column seen in the kind (absent ones as null),
/// strings are trimmed with empty ones turned into null, and dedupe-key
/// columns are folded again so hand-edited files still collapse.
pub fn clean_rows(rows: Vec<Row>, plan: &KindPlan) -> Vec<Row> {
    let columns: BTreeSet<String> = rows.iter().flat_map(|row| row.keys().cloned()).collect();

    rows.into_iter()
        .map(|mut row| {
            for column in &columns {
                let value = row.remove(column).map(clean_value).unwrap_or(Value::Null);
                row.insert(column.clone(), value);
            }
            for column in plan.dedupe_columns {
                if let Some(Value::String(s)) = row.get(*column) {
                    let key = dedupe_key(s);
                    row.insert(column.to_string(), Value::String(key));
                }
            }
            row
        })
        .collect()
}

fn has_required(row: &Row, plan: &KindPlan) -> bool {
    plan.required
        .iter()
        .all(|column| row.get(*column).is_some_and(|v| !v.is_null()))
}

enum BatchOutcome {
    Loaded { rows: u64, unmatched: u64 },
    Skipped,
    Failed { rows: u64 },
}

/// Load one kind's cleaned rows.
pub async fn load_kind(backend: &dyn GraphBackend, plan: &KindPlan, rows: Vec<Row>, options: &LoadOptions) -> KindLoadSummary {
    let start = Instant::now();
    let mut summary = KindLoadSummary::new(plan.kind);
    summary.rows_read = rows.len() as u64;

    let batch_size = options.batch_size.max(1);
    let total = rows.len();
    let batch_count = total.div_ceil(batch_size);
    info!(
        "Loading {}: {} rows, {} batches (batch size {})",
        plan.kind, total, batch_count, batch_size
    );

    let mut batches: Vec<Vec<Row>> = Vec::with_capacity(batch_count);
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        batches.push(rows.by_ref().take(batch_size).collect());
    }

    let statement = &plan.statement;
    let kind = plan.kind;
    let outcomes: Vec<(u64, BatchOutcome)> = stream::iter(batches.into_iter().enumerate().map(|(idx, batch)| {
        let number = idx + 1;
        let end = (number * batch_size).min(total);
        async move {
            let raw = batch.len() as u64;
            let valid: Vec<Row> = batch.into_iter().filter(|row| has_required(row, plan)).collect();
            let dropped = raw - valid.len() as u64;

            if valid.is_empty() {
                info!("{}: Batch {}/{} skipped (no valid rows)", kind, number, batch_count);
                return (dropped, BatchOutcome::Skipped);
            }

            match backend.upsert(statement, &valid).await {
                Ok(outcome) => {
                    info!("{}: Batch {}/{} loaded ({}/{})", kind, number, batch_count, end, total);
                    (
                        dropped,
                        BatchOutcome::Loaded {
                            rows: outcome.written,
                            unmatched: outcome.unmatched,
                        },
                    )
                }
                Err(e) => {
                    error!("{}: Batch {}/{} failed: {}", kind, number, batch_count, e);
                    (dropped, BatchOutcome::Failed { rows: valid.len() as u64 })
                }
            }
        }
    }))
    .buffer_unordered(options.concurrency.max(1))
    .collect()
    .await;

    for (dropped, outcome) in outcomes {
        summary.rows_dropped += dropped;
        match outcome {
            BatchOutcome::Loaded { rows, unmatched } => {
                summary.batches_loaded += 1;
                summary.rows_loaded += rows;
                summary.unmatched += unmatched;
            }
            BatchOutcome::Skipped => summary.batches_skipped += 1,
            BatchOutcome::Failed { rows } => {
                summary.batches_failed += 1;
                debug!("{}: {} rows not loaded", kind, rows);
            }
        }
    }

    summary.elapsed_secs = start.elapsed().as_secs_f64();
    info!("{} completed in {:.2} seconds.", plan.kind, summary.elapsed_secs);
    summary
}

/// Load every kind found under `data_dir`, nodes before relationships.
///
/// Per-batch failures are counted in the summary; only an unreadable
/// directory or file aborts the load.
pub async fn load_directory(backend: &dyn GraphBackend, data_dir: &Path, options: &LoadOptions) -> LoadResult<LoadSummary> {
    if !data_dir.is_dir() {
        return Err(LoadError::MissingDataDir(data_dir.to_path_buf()));
    }

    let start = Instant::now();
    let mut summary = LoadSummary::default();
    for plan in load_plan() {
        let (rows, unparsable) = read_rows(&data_dir.join(plan.file_name()))?;
        let rows = clean_rows(rows, &plan);
        let mut kind_summary = load_kind(backend, &plan, rows, options).await;
        kind_summary.rows_dropped += unparsable;
        summary.kinds.push(kind_summary);
    }
    backend.persist().await?;

    summary.elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        "Load finished in {:.2}s: {} rows read, {} loaded, {} dropped, {} failed batches",
        summary.elapsed_secs,
        summary.rows_read(),
        summary.rows_loaded(),
        summary.rows_dropped(),
        summary.batches_failed()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmbeddedBackend;
    use crate::graph::{EdgeType, Label};
    use crate::load::plan::plan_for;
    use serde_json::json;
    use std::fs;

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_clean_rows() {
        let plan = plan_for(RecordKind::Condition).unwrap();
        let cleaned = clean_rows(
            rows(vec![
                json!({"key": "  Asthma ", "name": " Asthma "}),
                json!({"key": "copd", "name": "", "extra": 1}),
            ]),
            &plan,
        );

        assert_eq!(cleaned[0]["key"], json!("asthma"));
        assert_eq!(cleaned[0]["name"], json!("Asthma"));
        assert!(cleaned[0]["extra"].is_null());
        assert!(cleaned[1]["name"].is_null());
        assert_eq!(cleaned[1]["extra"], json!(1));
    }

    #[test]
    fn test_read_rows_skips_bad_lines_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.jsonl");
        fs::write(&path, "{\"nctId\":\"NCT1\"}\n\nnot json\n[1,2]\n{\"nctId\":\"NCT2\"}\n").unwrap();

        let (rows, dropped) = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(dropped, 2);

        let (rows, dropped) = read_rows(&dir.path().join("absent.jsonl")).unwrap();
        assert!(rows.is_empty());
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_read_rows_drops_invalid_utf8_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.jsonl");
        let mut bytes = b"{\"nctId\":\"NCT1\"}\n{\"nctId\":\"NCT\xff2\"}\n".to_vec();
        bytes.extend_from_slice(b"\xfe\xff\n{\"nctId\":\"NCT3\"}");
        fs::write(&path, bytes).unwrap();

        let (rows, dropped) = read_rows(&path).unwrap();
        assert_eq!(dropped, 2);
        let ids: Vec<&Value> = rows.iter().map(|r| &r["nctId"]).collect();
        assert_eq!(ids, vec![&json!("NCT1"), &json!("NCT3")]);
    }

    #[tokio::test]
    async fn test_batches_and_required_keys() {
        let backend = EmbeddedBackend::in_memory();
        let plan = plan_for(RecordKind::Trial).unwrap();
        let input = clean_rows(
            rows(vec![
                json!({"nctId": "NCT1"}),
                json!({"nctId": "  "}),
                json!({"nctId": "NCT2"}),
                json!({"nctId": null}),
                json!({"briefTitle": "no id"}),
            ]),
            &plan,
        );
        let options = LoadOptions {
            batch_size: 2,
            concurrency: 2,
        };

        let summary = load_kind(&backend, &plan, input, &options).await;
        assert_eq!(summary.rows_read, 5);
        assert_eq!(summary.rows_loaded, 2);
        assert_eq!(summary.rows_dropped, 3);
        // [NCT1, blank], [NCT2, null], [no id]
        assert_eq!(summary.batches_loaded, 2);
        assert_eq!(summary.batches_skipped, 1);
        assert_eq!(summary.batches_failed, 0);
        assert_eq!(backend.store().read().await.label_count(&Label::new("Trial")), 2);
    }

    #[tokio::test]
    async fn test_all_dropped_batch_is_skipped_not_failed() {
        let backend = EmbeddedBackend::in_memory();
        let plan = plan_for(RecordKind::Arm).unwrap();
        let input = clean_rows(rows(vec![json!({"armId": null, "nctId": "NCT1"}), json!({"nctId": "NCT1"})]), &plan);

        let summary = load_kind(&backend, &plan, input, &LoadOptions::default()).await;
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_dropped, 2);
        assert_eq!(summary.rows_loaded, 0);
        assert_eq!(summary.batches_skipped, 1);
        assert_eq!(summary.batches_failed, 0);
    }

    #[tokio::test]
    async fn test_edge_without_endpoint_is_a_no_op() {
        let backend = EmbeddedBackend::in_memory();
        let trials = plan_for(RecordKind::Trial).unwrap();
        load_kind(&backend, &trials, rows(vec![json!({"nctId": "NCT1"})]), &LoadOptions::default()).await;

        let studies = plan_for(RecordKind::Studies).unwrap();
        let input = clean_rows(
            rows(vec![json!({"nctId": "NCT1", "conditionKey": "asthma", "conditionName": "Asthma"})]),
            &studies,
        );
        let summary = load_kind(&backend, &studies, input, &LoadOptions::default()).await;

        assert_eq!(summary.batches_failed, 0);
        assert_eq!(summary.unmatched, 1);
        assert!(backend
            .store()
            .read()
            .await
            .get_edges_by_type(&EdgeType::new("STUDIES"))
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_dir_is_fatal() {
        let backend = EmbeddedBackend::in_memory();
        let dir = tempfile::tempdir().unwrap();
        let err = load_directory(&backend, &dir.path().join("nope"), &LoadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingDataDir(_)));
    }
}
