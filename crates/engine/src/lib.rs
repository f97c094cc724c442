//! Incremental build engine
//!
//! Brings a destination tree up to date with a source tree by applying a
//! [`Filter`] only to files that changed since the previous build, either
//! directly or through a dependency they declared.

pub mod deps;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod merge;
pub mod queue;
pub mod stats;
pub mod strategy;

pub use deps::{Dependencies, DependencyError, DependencyState, DependencyStates};
pub use engine::{BuildReport, CacheMode, Engine, EngineOptions};
pub use error::{EngineError, FilterError};
pub use executor::{ExecMode, LinkMode};
pub use filter::{Filter, PathMapper};
pub use stats::BuildStats;
pub use strategy::{CacheStrategy, ProcessRequest, Strategy};

// Re-exported for filter implementations and embedders
pub use sift_core::{Blake3Hash, BlobStore, CacheBackend, MemoryStore};
