//! Durable storage for the embedded graph
//!
//! The embedded backend keeps its whole graph in memory and persists it as a
//! single compressed snapshot file after each successful command.

pub mod snapshot;

pub use snapshot::{load_snapshot, save_snapshot, Snapshot, SnapshotError, SnapshotResult};
