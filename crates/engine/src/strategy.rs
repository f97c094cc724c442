//! Cache strategies
//!
//! The strategy decides, per content operation, whether the filter runs or a
//! previously stored output is returned. It is chosen once when the engine is
//! built and never swapped afterwards.

use crate::error::FilterError;
use crate::filter::Filter;
use crate::stats::BuildStats;
use sift_core::{Blake3Hash, CacheBackend, IncrementalHasher};
use std::sync::Arc;
use tracing::{debug, warn};

/// One content operation handed to a strategy
#[derive(Debug, Clone, Copy)]
pub struct ProcessRequest<'a> {
    /// Source file contents
    pub contents: &'a str,
    /// Path relative to the source directory
    pub relative_path: &'a str,
    /// Skip the cache read even if an entry exists
    pub force: bool,
    /// Digest of the file's discovered dependencies, if any
    pub dependency_fingerprint: Option<Blake3Hash>,
}

impl<'a> ProcessRequest<'a> {
    /// Request with no forcing and no dependencies
    pub fn new(contents: &'a str, relative_path: &'a str) -> Self {
        Self {
            contents,
            relative_path,
            force: false,
            dependency_fingerprint: None,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn dependency_fingerprint(mut self, fingerprint: Option<Blake3Hash>) -> Self {
        self.dependency_fingerprint = fingerprint;
        self
    }
}

/// Produce the output for one content operation
pub trait CacheStrategy: Send + Sync {
    fn process_string(
        &self,
        filter: &dyn Filter,
        request: &ProcessRequest<'_>,
        stats: &mut BuildStats,
    ) -> Result<String, FilterError>;
}

fn run_filter(
    filter: &dyn Filter,
    request: &ProcessRequest<'_>,
    stats: &mut BuildStats,
) -> Result<String, FilterError> {
    stats.processed += 1;
    if request.force {
        stats.forced += 1;
    }
    filter.process_string(request.contents, request.relative_path)
}

/// Always runs the filter
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectStrategy;

impl CacheStrategy for DirectStrategy {
    fn process_string(
        &self,
        filter: &dyn Filter,
        request: &ProcessRequest<'_>,
        stats: &mut BuildStats,
    ) -> Result<String, FilterError> {
        run_filter(filter, request, stats)
    }
}

/// Stores outputs in a [`CacheBackend`] keyed by content, path and filter
///
/// The filter fingerprint is taken once, when the engine is built.
#[derive(Clone)]
pub struct PersistentStrategy {
    backend: Arc<dyn CacheBackend>,
    filter_key: Blake3Hash,
}

impl std::fmt::Debug for PersistentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStrategy")
            .field("filter_key", &self.filter_key)
            .finish_non_exhaustive()
    }
}

impl PersistentStrategy {
    pub fn new(backend: Arc<dyn CacheBackend>, filter_key: Blake3Hash) -> Self {
        Self { backend, filter_key }
    }

    /// Backend key for a request
    ///
    /// Folds the filter fingerprint in first so that two filters never share
    /// entries, then the filter's own per-file key, then the dependency digest.
    pub fn cache_key(&self, filter: &dyn Filter, request: &ProcessRequest<'_>) -> String {
        let mut hasher = IncrementalHasher::new();
        hasher
            .part(self.filter_key.as_bytes())
            .part(
                filter
                    .cache_key_process_string(request.contents, request.relative_path)
                    .as_bytes(),
            );
        match &request.dependency_fingerprint {
            Some(fp) => hasher.part(fp.as_bytes()),
            None => hasher.part(&[]),
        };
        hasher.finalize().to_hex()
    }

    fn lookup(&self, key: &str, relative_path: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(output) => Some(output),
                Err(_) => {
                    warn!(path = relative_path, key, "cached output is not UTF-8, recomputing");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(path = relative_path, key, error = %e, "cache read failed, recomputing");
                None
            }
        }
    }
}

impl CacheStrategy for PersistentStrategy {
    fn process_string(
        &self,
        filter: &dyn Filter,
        request: &ProcessRequest<'_>,
        stats: &mut BuildStats,
    ) -> Result<String, FilterError> {
        let key = self.cache_key(filter, request);

        if !request.force {
            if let Some(output) = self.lookup(&key, request.relative_path) {
                debug!(path = request.relative_path, "cache hit");
                stats.cache_hits += 1;
                return Ok(output);
            }
        }

        debug!(path = request.relative_path, force = request.force, "cache miss");
        let output = run_filter(filter, request, stats)?;

        match self.backend.set(&key, output.as_bytes()) {
            Ok(()) => stats.cache_primes += 1,
            Err(e) => {
                warn!(path = request.relative_path, error = %e, "failed to store cached output");
                stats.cache_write_failures += 1;
            }
        }
        Ok(output)
    }
}

/// The strategy selected for an engine
#[derive(Debug, Clone)]
pub enum Strategy {
    Direct(DirectStrategy),
    Persistent(PersistentStrategy),
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Direct(DirectStrategy)
    }
}

impl Strategy {
    /// Persistent strategy over `backend` for the filter fingerprinted by `filter_key`
    pub fn persistent(backend: Arc<dyn CacheBackend>, filter_key: Blake3Hash) -> Self {
        Strategy::Persistent(PersistentStrategy::new(backend, filter_key))
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Strategy::Persistent(_))
    }
}

impl CacheStrategy for Strategy {
    fn process_string(
        &self,
        filter: &dyn Filter,
        request: &ProcessRequest<'_>,
        stats: &mut BuildStats,
    ) -> Result<String, FilterError> {
        match self {
            Strategy::Direct(s) => s.process_string(filter, request, stats),
            Strategy::Persistent(s) => s.process_string(filter, request, stats),
        }
    }
}
