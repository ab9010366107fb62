//! Gzip-compressed bincode snapshots of a [`GraphStore`]

use crate::graph::{Edge, GraphError, GraphStore, Node};
use crate::index::PropertyIndexKey;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Bumped whenever the serialized layout changes
const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Unsupported snapshot format {found}")]
    Format { found: u32 },

    #[error("Corrupt snapshot: {0}")]
    Corrupt(#[from] GraphError),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Serialized form of a whole graph
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u32,
    /// Unix milliseconds
    pub created_at: i64,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub constraints: Vec<PropertyIndexKey>,
}

impl Snapshot {
    pub fn capture(store: &GraphStore) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            created_at: chrono::Utc::now().timestamp_millis(),
            nodes: store.all_nodes().cloned().collect(),
            edges: store.all_edges().cloned().collect(),
            constraints: store.constraints(),
        }
    }

    /// Rebuild a store: nodes first, then edges, then constraint indexes.
    pub fn restore(self) -> SnapshotResult<GraphStore> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(SnapshotError::Format { found: self.format });
        }
        let mut store = GraphStore::new();
        for node in self.nodes {
            store.insert_recovered_node(node);
        }
        for edge in self.edges {
            store.insert_recovered_edge(edge)?;
        }
        for key in self.constraints {
            store.create_unique_constraint(key.label, key.property)?;
        }
        Ok(store)
    }
}

/// Write `store` to `path`, replacing any previous snapshot atomically.
pub fn save_snapshot(store: &GraphStore, path: impl AsRef<Path>) -> SnapshotResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let snapshot = Snapshot::capture(store);
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        bincode::serialize_into(&mut encoder, &snapshot)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    info!(
        "Saved snapshot to {}: {} nodes, {} edges",
        path.display(),
        snapshot.nodes.len(),
        snapshot.edges.len()
    );
    Ok(())
}

/// Load the store saved at `path`; a missing file yields an empty store.
pub fn load_snapshot(path: impl AsRef<Path>) -> SnapshotResult<GraphStore> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No snapshot at {}, starting empty", path.display());
        return Ok(GraphStore::new());
    }

    let file = File::open(path)?;
    let snapshot: Snapshot = bincode::deserialize_from(GzDecoder::new(BufReader::new(file)))?;
    info!(
        "Recovered {} nodes and {} edges from {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        path.display()
    );
    snapshot.restore()
}
