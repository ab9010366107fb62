//! Sequential extraction driver
//!
//! Reads documents one at a time, extracts each completely (or diverts it to
//! the dead-letter sink) and routes the records to the sinks before reading
//! the next one.

use super::extractor::{document_id, ExtractError, ExtractionContext};
use super::reader::{self, DocumentStream, ReadError, StreamError};
use super::records::RecordKind;
use super::sink::{DeadLetter, RecordSink, SinkError, SinkMultiplexer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that abort an extraction run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Extraction tuning knobs
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Characters of the offending input kept in dead-letter entries
    pub excerpt_chars: usize,
    /// Log progress every N documents
    pub progress_interval: u64,
    /// Flush the sinks every N documents
    pub flush_interval: u64,
    /// Count the input up front for progress reporting
    pub estimate_total: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            excerpt_chars: 400,
            progress_interval: 1000,
            flush_interval: 1000,
            estimate_total: true,
        }
    }
}

/// Counters for one extraction run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionSummary {
    /// Items read from the input, including unparsable lines
    pub documents: u64,
    pub extracted: u64,
    pub parse_errors: u64,
    pub missing_identifier: u64,
    pub extraction_errors: u64,
    pub records: BTreeMap<RecordKind, u64>,
    pub elapsed_secs: f64,
}

impl ExtractionSummary {
    pub fn dead_lettered(&self) -> u64 {
        self.parse_errors + self.missing_identifier + self.extraction_errors
    }

    /// Records written for `kind`
    pub fn count(&self, kind: RecordKind) -> u64 {
        self.records.get(&kind).copied().unwrap_or(0)
    }

    fn progress(&self, total: Option<u64>) {
        let counts = format!(
            "trials={} orgs={} interventions={} arms={} outcomes={} results={} criteria={} dead={}",
            self.count(RecordKind::Trial),
            self.count(RecordKind::Organization),
            self.count(RecordKind::Intervention),
            self.count(RecordKind::Arm),
            self.count(RecordKind::Outcome),
            self.count(RecordKind::Result),
            self.count(RecordKind::EligibilityCriterion),
            self.dead_lettered(),
        );
        match total {
            Some(total) if total > 0 => info!(
                "Processed {}/{} documents ({:.1}%) {}",
                self.documents,
                total,
                self.documents as f64 * 100.0 / total as f64,
                counts
            ),
            _ => info!("Processed {} documents {}", self.documents, counts),
        }
    }
}

/// Drive extraction over `stream`, writing every record to `sink`.
///
/// Only sink failures abort the run. Parse, identifier and extraction
/// failures are dead-lettered and counted.
pub fn run_extraction<S: RecordSink + ?Sized>(
    stream: DocumentStream,
    ctx: &mut ExtractionContext,
    sink: &mut S,
    options: &ExtractOptions,
) -> Result<ExtractionSummary, SinkError> {
    let start = Instant::now();
    let total = stream.estimated_total();
    info!("Starting extraction. Estimated total documents: {:?}", total);

    let mut summary = ExtractionSummary::default();
    for item in stream {
        summary.documents += 1;

        match item {
            Ok(doc) => match ctx.extract(&doc) {
                Ok(records) => {
                    for record in &records {
                        sink.write_record(record)?;
                        *summary.records.entry(record.kind()).or_insert(0) += 1;
                    }
                    summary.extracted += 1;
                }
                Err(ExtractError::MissingIdentifier) => {
                    warn!("Document {} has no nctId, dead-lettered", summary.documents);
                    sink.dead_letter(&DeadLetter::missing_identifier(&doc, options.excerpt_chars))?;
                    summary.missing_identifier += 1;
                }
                Err(e) => {
                    let nct_id = document_id(&doc);
                    warn!("Error processing trial {:?}: {}", nct_id, e);
                    sink.dead_letter(&DeadLetter::extraction(nct_id, e.to_string(), &doc, options.excerpt_chars))?;
                    summary.extraction_errors += 1;
                }
            },
            Err(StreamError::Parse(failure)) => {
                warn!("JSON parse error on line {}: {}", failure.line, failure.message);
                sink.dead_letter(&DeadLetter::parse(&failure, options.excerpt_chars))?;
                summary.parse_errors += 1;
            }
            Err(StreamError::Io(e)) => {
                summary.documents -= 1;
                error!("Input read failed after {} documents, stopping: {}", summary.documents, e);
                break;
            }
        }

        if options.flush_interval > 0 && summary.documents % options.flush_interval == 0 {
            sink.flush()?;
        }
        if options.progress_interval > 0 && summary.documents % options.progress_interval == 0 {
            summary.progress(total);
        }
    }

    sink.flush()?;
    summary.elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        "Done. Processed {} documents ({} extracted, {} dead-lettered) in {:.2}s",
        summary.documents,
        summary.extracted,
        summary.dead_lettered(),
        summary.elapsed_secs
    );
    Ok(summary)
}

/// Extract `input` into per-kind files under `out_dir`.
///
/// A missing input or an unusable output directory is fatal.
pub fn extract_file(input: &Path, out_dir: &Path, options: &ExtractOptions) -> IngestResult<ExtractionSummary> {
    info!("Starting split for {} -> {}", input.display(), out_dir.display());
    let mut stream = DocumentStream::open(input)?;
    if options.estimate_total && stream.estimated_total().is_none() {
        let total = reader::estimate_total(input);
        stream = stream.with_estimated_total(total);
    }
    let mut sink = SinkMultiplexer::open(out_dir)?;
    let mut ctx = ExtractionContext::new(input.display().to_string());
    Ok(run_extraction(stream, &mut ctx, &mut sink, options)?)
}
