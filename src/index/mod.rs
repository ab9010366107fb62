//! Unique-key indexing
//!
//! Backs the embedded store's uniqueness constraints and gives merges an
//! O(1) path from a key value to its node.

pub mod manager;
pub mod unique_index;

pub use manager::{IndexManager, PropertyIndexKey};
pub use unique_index::UniqueIndex;
