//! Flattening of nested clinical-trial documents
//!
//! Control flow: [`reader`] produces documents, [`extractor`] turns each into
//! typed [`records`], and [`sink`] routes them to one append-only file per
//! kind. [`pipeline`] drives the whole run.

pub mod eligibility;
pub mod extractor;
pub mod normalize;
pub mod path;
pub mod pipeline;
pub mod reader;
pub mod records;
pub mod sink;

pub use extractor::{document_id, ExtractError, ExtractionContext};
pub use pipeline::{extract_file, run_extraction, ExtractOptions, ExtractionSummary, IngestError};
pub use reader::{DocumentStream, InputFormat, ReadError};
pub use records::{Record, RecordKind, Section};
pub use sink::{DeadLetter, DeadLetterKind, MemorySink, RecordSink, SinkError, SinkMultiplexer, DEAD_LETTER_FILE};
