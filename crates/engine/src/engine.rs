//! The build cycle
//!
//! An [`Engine`] owns the current snapshot, the dependency tracker and the
//! set of linked destination files for one source/destination pair. Each
//! call to [`Engine::build`] brings the destination up to date with the
//! source and returns what it did.

use crate::deps::Dependencies;
use crate::error::EngineError;
use crate::executor::{ExecContext, ExecMode, LinkMode, PatchExecutor};
use crate::filter::{validate_filter, Filter};
use crate::merge::merge_invalidations;
use crate::stats::BuildStats;
use crate::strategy::Strategy;
use serde::Serialize;
use sift_core::{diff, CacheBackend, Operation, Patch, Snapshot};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which cache strategy the engine uses
#[derive(Clone, Default)]
pub enum CacheMode {
    /// Recompute every content operation
    #[default]
    Direct,
    /// Keep outputs in a backend shared across builds and processes
    Persistent(Arc<dyn CacheBackend>),
}

impl std::fmt::Debug for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheMode::Direct => f.write_str("Direct"),
            CacheMode::Persistent(_) => f.write_str("Persistent(..)"),
        }
    }
}

/// Engine configuration
///
/// Concurrency has no implicit default; embedding applications pick one.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub cache: CacheMode,
    pub mode: ExecMode,
    /// Maximum content operations in flight in async mode
    pub concurrency: usize,
    pub link_mode: LinkMode,
    /// Track discovered dependencies and reprocess dependents when they change
    pub dependency_invalidation: bool,
}

impl EngineOptions {
    pub fn new(source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            cache: CacheMode::Direct,
            mode: ExecMode::Sync,
            concurrency,
            link_mode: LinkMode::Symlink,
            dependency_invalidation: false,
        }
    }

    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    pub fn mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn link_mode(mut self, link_mode: LinkMode) -> Self {
        self.link_mode = link_mode;
        self
    }

    pub fn dependency_invalidation(mut self, enabled: bool) -> Self {
        self.dependency_invalidation = enabled;
        self
    }
}

/// What one build did
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Patches applied, in order
    pub patches: Vec<Patch>,
    /// Files reprocessed because a dependency changed
    pub invalidated: BTreeSet<String>,
    pub stats: BuildStats,
    /// Whether the destination was wiped before this build
    pub reset: bool,
}

/// Incremental build engine for one source/destination pair
pub struct Engine {
    filter: Arc<dyn Filter>,
    strategy: Arc<Strategy>,
    source_dir: PathBuf,
    dest_dir: PathBuf,
    mode: ExecMode,
    concurrency: usize,
    link_mode: LinkMode,
    dependency_invalidation: bool,
    current: Snapshot,
    deps: Dependencies,
    linked: HashSet<String>,
    /// Set while a cycle runs; still set on the next call if that cycle failed
    needs_reset: bool,
}

impl Engine {
    /// Create an engine, validating the filter and both directories
    ///
    /// The destination is created if it does not exist.
    pub fn new(filter: Arc<dyn Filter>, options: EngineOptions) -> Result<Self, EngineError> {
        validate_filter(filter.as_ref())?;
        if options.concurrency == 0 {
            return Err(EngineError::InvalidOptions("concurrency must be at least 1".to_string()));
        }

        let source_dir = options.source_dir.canonicalize().map_err(|e| {
            EngineError::InvalidOptions(format!("source {}: {e}", options.source_dir.display()))
        })?;
        if !source_dir.is_dir() {
            return Err(EngineError::InvalidOptions(format!(
                "source {} is not a directory",
                source_dir.display()
            )));
        }

        let dest_dir = fs::create_dir_all(&options.dest_dir)
            .and_then(|_| options.dest_dir.canonicalize())
            .map_err(|e| EngineError::InvalidOptions(format!("dest {}: {e}", options.dest_dir.display())))?;
        if dest_dir.starts_with(&source_dir) || source_dir.starts_with(&dest_dir) {
            return Err(EngineError::InvalidOptions(format!(
                "source {} and dest {} overlap",
                source_dir.display(),
                dest_dir.display()
            )));
        }

        let strategy = match options.cache {
            CacheMode::Direct => Strategy::default(),
            CacheMode::Persistent(backend) => Strategy::persistent(backend, filter.cache_key()),
        };
        Ok(Self {
            filter,
            strategy: Arc::new(strategy),
            deps: Dependencies::new(&source_dir),
            source_dir,
            dest_dir,
            mode: options.mode,
            concurrency: options.concurrency,
            link_mode: options.link_mode,
            dependency_invalidation: options.dependency_invalidation,
            current: Snapshot::empty(),
            linked: HashSet::new(),
            needs_reset: true,
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Snapshot of the source as of the last build
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Dependency records as of the last successful build
    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    pub fn is_persistent(&self) -> bool {
        self.strategy.is_persistent()
    }

    /// Run one build cycle
    ///
    /// The first build, and the first build after a failed one, starts from
    /// an empty destination.
    pub async fn build(&mut self) -> Result<BuildReport, EngineError> {
        let reset = self.needs_reset;
        if reset {
            self.reset()?;
        }

        self.needs_reset = true;
        let result = self.cycle(reset).await;
        match &result {
            Ok(_) => self.needs_reset = false,
            Err(e) => warn!(error = %e, "build failed, next build starts from a clean destination"),
        }
        result
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        info!(dest = %self.dest_dir.display(), "resetting destination");
        let entries = fs::read_dir(&self.dest_dir).map_err(|source| EngineError::Reset {
            path: self.dest_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| EngineError::Reset {
                path: self.dest_dir.clone(),
                source,
            })?;
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let removed = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|source| EngineError::Reset { path, source })?;
        }

        self.current = Snapshot::empty();
        self.deps = Dependencies::new(&self.source_dir);
        self.linked.clear();
        Ok(())
    }

    async fn cycle(&mut self, reset: bool) -> Result<BuildReport, EngineError> {
        let started = Instant::now();
        let next = Snapshot::scan(&self.source_dir).map_err(|source| EngineError::Scan {
            dir: self.source_dir.clone(),
            source,
        })?;

        let patches = diff(&self.current, &next);
        let invalidated = if self.dependency_invalidation {
            self.deps.invalidated_files()
        } else {
            BTreeSet::new()
        };
        let patches = merge_invalidations(&invalidated, &self.current, &next, patches);

        if patches.is_empty() {
            debug!(entries = next.len(), "no changes");
            return Ok(BuildReport {
                reset,
                ..BuildReport::default()
            });
        }

        info!(
            patches = patches.len(),
            invalidated = invalidated.len(),
            entries = next.len(),
            "applying patches"
        );

        let removed: Vec<&str> = patches
            .iter()
            .filter(|p| p.op == Operation::Unlink)
            .map(|p| p.path.as_str())
            .collect();
        let mut deps = self.deps.without_files(&removed);
        self.current = next;

        let ctx = ExecContext {
            filter: self.filter.clone(),
            strategy: self.strategy.clone(),
            source_dir: self.source_dir.clone(),
            dest_dir: self.dest_dir.clone(),
            track_dependencies: self.dependency_invalidation,
        };
        let outcome = PatchExecutor::new(ctx, &mut self.linked)
            .mode(self.mode)
            .concurrency(self.concurrency)
            .link_mode(self.link_mode)
            .apply(&patches, &invalidated)
            .await?;

        for discovered in outcome.dependencies {
            if let Some(states) = discovered.states {
                deps.record(&discovered.relative_path, states)?;
            }
        }
        deps.seal();
        self.deps = deps;

        info!(
            processed = outcome.stats.processed,
            cache_hits = outcome.stats.cache_hits,
            linked = outcome.stats.linked,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );

        Ok(BuildReport {
            patches,
            invalidated,
            stats: outcome.stats,
            reset,
        })
    }
}
