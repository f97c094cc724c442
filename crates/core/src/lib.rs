//! Sift Core - snapshot, diff and storage primitives for the Sift build engine
//!
//! This crate provides the foundational layer:
//! - BLAKE3 hashing
//! - Tree snapshots and component-wise path ordering
//! - Snapshot diffing into ordered patch lists
//! - Cache backends (on-disk blob store, in-memory store)

pub mod hash;
pub mod patch;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use hash::{hash_bytes, hash_file, Blake3Hash, IncrementalHasher};
pub use patch::{diff, is_ordered, Operation, Patch};
pub use store::{BlobStore, CacheBackend, MemoryStore, StoreError};
pub use tree::{normalize_path, Entry, EntryKind, Metadata, Snapshot, SnapshotError};
