//! Streaming input reader
//!
//! Accepts newline-delimited JSON or a single enclosing JSON array, plain or
//! gzip-compressed. The framing is decided by peeking at the first
//! non-whitespace byte. JSON Lines input is parsed lazily one line at a
//! time; array input is parsed into memory up front and then iterated.

use flate2::read::MultiGzDecoder;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors that make the whole input unusable
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Input file {0} not found")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Input looks like a JSON array but could not be parsed: {0}")]
    MalformedArray(#[source] serde_json::Error),
}

pub type ReadResult<T> = Result<T, ReadError>;

/// Input framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One JSON document per line
    JsonLines,
    /// One JSON array holding every document
    JsonArray,
}

/// A line that could not be parsed as JSON
#[derive(Debug, Clone)]
pub struct ParseFailure {
    /// 1-based line number in the decompressed input
    pub line: usize,
    pub raw: String,
    pub message: String,
}

/// A failed item in the document stream
#[derive(Debug)]
pub enum StreamError {
    /// Malformed line; the stream continues after it
    Parse(ParseFailure),
    /// Read failure; the stream ends after reporting it
    Io(io::Error),
}

type Input = Box<dyn BufRead + Send>;

/// Open `path` for reading, transparently decompressing gzip input.
pub fn open_input(path: &Path) -> ReadResult<Input> {
    if !path.exists() {
        return Err(ReadError::NotFound(path.to_path_buf()));
    }
    let mut reader = BufReader::new(File::open(path)?);
    let gz_suffix = path.extension().map_or(false, |ext| ext == "gz");
    let magic = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if magic || gz_suffix {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Consume leading whitespace and report the framing. Empty input counts
/// as JSON Lines.
pub fn detect_format<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<InputFormat> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(InputFormat::JsonLines);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(idx) => {
                let format = if buf[idx] == b'[' {
                    InputFormat::JsonArray
                } else {
                    InputFormat::JsonLines
                };
                reader.consume(idx);
                return Ok(format);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Best-effort count of documents in `path` for progress reporting.
///
/// Counts non-blank lines for JSON Lines input and elements for array input.
/// Any failure yields `None`, meaning indeterminate progress.
pub fn estimate_total(path: &Path) -> Option<u64> {
    let count = || -> ReadResult<u64> {
        let mut input = open_input(path)?;
        match detect_format(&mut input)? {
            InputFormat::JsonArray => {
                let docs: Vec<Value> =
                    serde_json::from_reader(input).map_err(ReadError::MalformedArray)?;
                Ok(docs.len() as u64)
            }
            InputFormat::JsonLines => {
                let mut total = 0u64;
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    if input.read_until(b'\n', &mut buf)? == 0 {
                        break;
                    }
                    if buf.iter().any(|b| !b.is_ascii_whitespace()) {
                        total += 1;
                    }
                }
                Ok(total)
            }
        }
    };

    match count() {
        Ok(total) => {
            info!("Counted {} documents in {}", total, path.display());
            Some(total)
        }
        Err(e) => {
            warn!("Failed to estimate input size, progress will be indeterminate: {}", e);
            None
        }
    }
}

enum Source {
    Lines {
        input: Input,
        line: usize,
        buf: Vec<u8>,
        finished: bool,
    },
    Array(std::vec::IntoIter<Value>),
}

/// Lazy, non-restartable sequence of parsed documents
pub struct DocumentStream {
    format: InputFormat,
    source: Source,
    estimated_total: Option<u64>,
}

impl DocumentStream {
    /// Open a file and detect its framing. Array input is parsed here.
    pub fn open(path: &Path) -> ReadResult<Self> {
        let mut input = open_input(path)?;
        let format = detect_format(&mut input)?;
        match format {
            InputFormat::JsonArray => {
                info!("Detected JSON array input, loading it into memory");
                let docs: Vec<Value> =
                    serde_json::from_reader(input).map_err(ReadError::MalformedArray)?;
                Ok(Self::from_documents(docs))
            }
            InputFormat::JsonLines => {
                info!("Detected JSON Lines input");
                Ok(Self::from_reader(input))
            }
        }
    }

    /// Stream JSON Lines from any reader.
    pub fn from_reader(input: impl BufRead + Send + 'static) -> Self {
        Self {
            format: InputFormat::JsonLines,
            source: Source::Lines {
                input: Box::new(input),
                line: 0,
                buf: Vec::new(),
                finished: false,
            },
            estimated_total: None,
        }
    }

    /// Iterate documents that are already in memory.
    pub fn from_documents(docs: Vec<Value>) -> Self {
        let total = docs.len() as u64;
        Self {
            format: InputFormat::JsonArray,
            source: Source::Array(docs.into_iter()),
            estimated_total: Some(total),
        }
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }

    /// Known or estimated number of documents, if any.
    pub fn estimated_total(&self) -> Option<u64> {
        self.estimated_total
    }

    pub fn with_estimated_total(mut self, total: Option<u64>) -> Self {
        if self.estimated_total.is_none() {
            self.estimated_total = total;
        }
        self
    }
}

impl Iterator for DocumentStream {
    type Item = Result<Value, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Array(docs) => docs.next().map(Ok),
            Source::Lines {
                input,
                line,
                buf,
                finished,
            } => loop {
                if *finished {
                    return None;
                }
                buf.clear();
                match input.read_until(b'\n', buf) {
                    Ok(0) => {
                        *finished = true;
                        return None;
                    }
                    Ok(_) => {
                        *line += 1;
                        if buf.iter().all(|b| b.is_ascii_whitespace()) {
                            continue;
                        }
                        let parsed = match serde_json::from_slice::<Value>(buf.as_slice()) {
                            Ok(doc) => Ok(doc),
                            Err(e) => Err(StreamError::Parse(ParseFailure {
                                line: *line,
                                raw: String::from_utf8_lossy(buf.as_slice()).trim().to_string(),
                                message: e.to_string(),
                            })),
                        };
                        return Some(parsed);
                    }
                    Err(e) => {
                        *finished = true;
                        return Some(Err(StreamError::Io(e)));
                    }
                }
            },
        }
    }
}
