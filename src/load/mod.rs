//! Batch loading of extracted records into a graph store
//!
//! [`plan`] fixes the statement and required keys per kind, [`constraints`]
//! prepares the store, and [`batch`] streams each kind's file through the
//! backend in bounded-concurrency batches.

pub mod batch;
pub mod constraints;
pub mod plan;
pub mod statement;

use crate::backend::BackendError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use batch::{clean_rows, load_directory, load_kind, read_rows, KindLoadSummary, LoadOptions, LoadSummary};
pub use constraints::{initialize_constraints, unique_constraints, ConstraintSummary, UniqueConstraint};
pub use plan::{load_plan, plan_for, KindPlan};
pub use statement::{EdgeUpsert, Endpoint, NodeUpsert, UpsertStatement};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Data directory {0} does not exist")]
    MissingDataDir(PathBuf),
}

pub type LoadResult<T> = Result<T, LoadError>;
