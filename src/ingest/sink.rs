//! Output sinks for extracted records
//!
//! The file multiplexer keeps one append-mode JSON Lines writer per record
//! kind plus a dead-letter file. Append mode means an interrupted run can be
//! rerun without destroying earlier partial output; duplicate rows are
//! resolved by the loader's merge semantics.

use super::normalize::truncate_chars;
use super::reader::ParseFailure;
use super::records::{Record, RecordKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Dead-letter file name inside the output directory
pub const DEAD_LETTER_FILE: &str = "dead_letter.jsonl";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Cannot open output file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Why an input item was diverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterKind {
    /// The line was not valid JSON
    Parse,
    /// The document had no trial identifier
    MissingNct,
    /// Extraction failed part-way through the document
    Extraction,
}

/// One unprocessable input item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub error: DeadLetterKind,
    pub nct_id: Option<String>,
    pub message: Option<String>,
    pub excerpt: String,
}

impl DeadLetter {
    pub fn parse(failure: &ParseFailure, excerpt_chars: usize) -> Self {
        Self {
            error: DeadLetterKind::Parse,
            nct_id: None,
            message: Some(format!("line {}: {}", failure.line, failure.message)),
            excerpt: truncate_chars(&failure.raw, excerpt_chars).to_string(),
        }
    }

    pub fn missing_identifier(doc: &Value, excerpt_chars: usize) -> Self {
        Self {
            error: DeadLetterKind::MissingNct,
            nct_id: None,
            message: None,
            excerpt: excerpt(doc, excerpt_chars),
        }
    }

    pub fn extraction(nct_id: Option<String>, message: String, doc: &Value, excerpt_chars: usize) -> Self {
        Self {
            error: DeadLetterKind::Extraction,
            nct_id,
            message: Some(message),
            excerpt: excerpt(doc, excerpt_chars),
        }
    }
}

fn excerpt(doc: &Value, excerpt_chars: usize) -> String {
    let text = doc.to_string();
    truncate_chars(&text, excerpt_chars).to_string()
}

/// Destination for extracted records and dead letters
pub trait RecordSink {
    fn write_record(&mut self, record: &Record) -> SinkResult<()>;

    fn dead_letter(&mut self, entry: &DeadLetter) -> SinkResult<()>;

    fn flush(&mut self) -> SinkResult<()>;
}

/// One append-mode JSON Lines file per record kind
pub struct SinkMultiplexer {
    dir: PathBuf,
    writers: FxHashMap<RecordKind, BufWriter<File>>,
    dead_letters: BufWriter<File>,
}

/// Terminate a torn last line left by an interrupted run, so the next
/// record starts on a line of its own.
fn repair_tail(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(false);
    }
    file.write_all(b"\n")?;
    Ok(true)
}

fn open_append(path: &Path) -> SinkResult<BufWriter<File>> {
    let open_error = |source| SinkError::Open {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(open_error)?;
    if repair_tail(&mut file).map_err(open_error)? {
        warn!("{} ended in a partial line, terminated it", path.display());
    }
    Ok(BufWriter::new(file))
}

impl SinkMultiplexer {
    /// Create `dir` if needed and open every output file in append mode.
    pub fn open(dir: impl AsRef<Path>) -> SinkResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| SinkError::Open {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut writers = FxHashMap::default();
        for kind in RecordKind::ALL {
            writers.insert(kind, open_append(&dir.join(kind.file_name()))?);
        }
        let dead_letters = open_append(&dir.join(DEAD_LETTER_FILE))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            writers,
            dead_letters,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecordSink for SinkMultiplexer {
    fn write_record(&mut self, record: &Record) -> SinkResult<()> {
        // One write per line, newline included
        let mut line = record.to_json_line()?;
        line.push('\n');
        // Every kind is opened up front
        if let Some(writer) = self.writers.get_mut(&record.kind()) {
            writer.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    fn dead_letter(&mut self, entry: &DeadLetter) -> SinkResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.dead_letters.write_all(line.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        self.dead_letters.flush()?;
        Ok(())
    }
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<Record>,
    pub dead_letters: Vec<DeadLetter>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(&self, kind: RecordKind) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &Record) -> SinkResult<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn dead_letter(&mut self, entry: &DeadLetter) -> SinkResult<()> {
        self.dead_letters.push(entry.clone());
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::records::ConditionNode;
    use serde_json::json;

    fn condition(name: &str) -> Record {
        Record::Condition(ConditionNode {
            key: name.to_lowercase(),
            name: name.to_string(),
        })
    }

    #[test]
    fn test_multiplexer_routes_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = SinkMultiplexer::open(dir.path()).unwrap();
            sink.write_record(&condition("Asthma")).unwrap();
            sink.write_record(&Record::scoped(RecordKind::HasArm, "NCT1", "NCT1::A")).unwrap();
            sink.flush().unwrap();
        }

        let conditions = fs::read_to_string(dir.path().join("conditions.jsonl")).unwrap();
        assert_eq!(conditions.lines().count(), 1);
        let arms = fs::read_to_string(dir.path().join("trial_has_arm_rel.jsonl")).unwrap();
        assert!(arms.contains("NCT1::A"));
        // Untouched kinds still get an (empty) file
        assert!(dir.path().join("versions.jsonl").exists());
        assert!(dir.path().join(DEAD_LETTER_FILE).exists());
    }

    #[test]
    fn test_multiplexer_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let mut sink = SinkMultiplexer::open(dir.path()).unwrap();
            sink.write_record(&condition("Asthma")).unwrap();
            sink.flush().unwrap();
        }
        let conditions = fs::read_to_string(dir.path().join("conditions.jsonl")).unwrap();
        assert_eq!(conditions.lines().count(), 2);
    }

    #[test]
    fn test_rerun_after_torn_tail_keeps_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conditions.jsonl");
        // An interrupted run: one complete record, then a partial one
        let complete = serde_json::to_string(&json!({"key": "diabetes", "name": "Diabetes"})).unwrap();
        let torn = format!("{{\"key\": \"{}\", \"name\": ", "x".repeat(9000));
        fs::write(&path, format!("{}\n{}", complete, torn)).unwrap();

        {
            let mut sink = SinkMultiplexer::open(dir.path()).unwrap();
            sink.write_record(&condition("Asthma")).unwrap();
            sink.flush().unwrap();
        }

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], complete);
        assert!(serde_json::from_str::<Value>(lines[1]).is_err());
        let asthma: Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(asthma["name"], "Asthma");
    }

    #[test]
    fn test_large_record_is_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let long = "y".repeat(20_000);
        {
            let mut sink = SinkMultiplexer::open(dir.path()).unwrap();
            sink.write_record(&condition(&long)).unwrap();
            sink.write_record(&condition("Asthma")).unwrap();
            sink.flush().unwrap();
        }
        let text = fs::read_to_string(dir.path().join("conditions.jsonl")).unwrap();
        let names: Vec<Value> = text.lines().map(|l| serde_json::from_str::<Value>(l).unwrap()["name"].clone()).collect();
        assert_eq!(names, vec![json!(long), json!("Asthma")]);
    }

    #[test]
    fn test_dead_letter_format() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({"protocolSection": {"identificationModule": {"briefTitle": "x".repeat(1000)}}});
        {
            let mut sink = SinkMultiplexer::open(dir.path()).unwrap();
            sink.dead_letter(&DeadLetter::missing_identifier(&doc, 400)).unwrap();
            sink.flush().unwrap();
        }
        let text = fs::read_to_string(dir.path().join(DEAD_LETTER_FILE)).unwrap();
        let entry: DeadLetter = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(entry.error, DeadLetterKind::MissingNct);
        assert_eq!(entry.nct_id, None);
        assert_eq!(entry.excerpt.chars().count(), 400);
    }

    #[test]
    fn test_open_fails_on_unusable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a dir").unwrap();
        assert!(matches!(
            SinkMultiplexer::open(blocker.join("out")),
            Err(SinkError::Open { .. })
        ));
    }
}
