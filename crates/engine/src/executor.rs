//! Applying patch lists to the destination tree
//!
//! Structural operations run inline and in patch order. Content operations
//! either link the source verbatim (files the filter does not accept) or go
//! through the cache strategy. In [`ExecMode::Async`] the content work is
//! collected during the ordered pass and handed to the bounded queue once
//! every structural operation has been applied.

use crate::deps::{capture_states, fingerprint, DependencyStates};
use crate::error::{EngineError, FilterError};
use crate::filter::Filter;
use crate::queue::{run_bounded, Task};
use crate::stats::BuildStats;
use crate::strategy::{CacheStrategy, ProcessRequest, Strategy};
use serde::{Deserialize, Serialize};
use sift_core::{Operation, Patch};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// How content operations are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Transform and write each file before moving to the next patch
    #[default]
    Sync,
    /// Defer transformations to the concurrency queue
    Async,
}

/// How files the filter does not accept reach the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Symlink to the source file (copies on platforms without symlinks)
    #[default]
    Symlink,
    /// Copy the source file
    Copy,
}

/// Everything a content job needs, shareable across tasks
#[derive(Clone)]
pub struct ExecContext {
    pub filter: Arc<dyn Filter>,
    pub strategy: Arc<Strategy>,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    /// Run the filter's dependency discovery hook
    pub track_dependencies: bool,
}

/// Dependencies discovered while processing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDependencies {
    pub relative_path: String,
    /// `None` when discovery failed and the previous record must be kept
    pub states: Option<DependencyStates>,
}

/// Result of applying one patch list
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub stats: BuildStats,
    pub dependencies: Vec<DiscoveredDependencies>,
}

/// Applies patch lists for one engine
pub struct PatchExecutor<'a> {
    ctx: ExecContext,
    mode: ExecMode,
    concurrency: usize,
    link_mode: LinkMode,
    /// Source-relative paths currently linked into the destination
    linked: &'a mut HashSet<String>,
}

impl<'a> PatchExecutor<'a> {
    pub fn new(ctx: ExecContext, linked: &'a mut HashSet<String>) -> Self {
        Self {
            ctx,
            mode: ExecMode::default(),
            concurrency: 1,
            link_mode: LinkMode::default(),
            linked,
        }
    }

    pub fn mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn link_mode(mut self, link_mode: LinkMode) -> Self {
        self.link_mode = link_mode;
        self
    }

    /// Apply `patches` in order
    ///
    /// Files in `invalidated` are processed with the cache read bypassed.
    /// The first failure aborts the remaining patches; nothing already
    /// written is rolled back.
    pub async fn apply(
        mut self,
        patches: &[Patch],
        invalidated: &BTreeSet<String>,
    ) -> Result<ApplyOutcome, EngineError> {
        let mut outcome = ApplyOutcome::default();
        let mut deferred = Vec::new();

        for patch in patches {
            match patch.op {
                Operation::Mkdir => {
                    let path = self.dest(&patch.path);
                    fs::create_dir_all(&path).map_err(|source| structural(patch.op, &path, source))?;
                    outcome.stats.record_patch(patch.op);
                }
                Operation::Rmdir => {
                    let path = self.dest(&patch.path);
                    tolerate_missing(fs::remove_dir(&path))
                        .map_err(|source| structural(patch.op, &path, source))?;
                    outcome.stats.record_patch(patch.op);
                }
                Operation::Unlink => {
                    self.unlink(&patch.path)?;
                    outcome.stats.record_patch(patch.op);
                }
                Operation::Create | Operation::Change => {
                    if !self.ctx.filter.can_process_file(&patch.path) {
                        self.link(patch)?;
                        outcome.stats.record_patch(patch.op);
                        outcome.stats.linked += 1;
                        continue;
                    }

                    let dest_relative = self.processed_dest(&patch.path)?;
                    if self.linked.remove(&patch.path) {
                        let stale = self.dest(&patch.path);
                        tolerate_missing(fs::remove_file(&stale))
                            .map_err(|source| structural(Operation::Unlink, &stale, source))?;
                    }

                    let job = ContentJob {
                        op: patch.op,
                        relative_path: patch.path.clone(),
                        dest_relative,
                        force: invalidated.contains(&patch.path),
                    };
                    match self.mode {
                        ExecMode::Sync => job.run(&self.ctx)?.merge_into(&mut outcome),
                        ExecMode::Async => deferred.push(job),
                    }
                }
            }
        }

        if !deferred.is_empty() {
            debug!(jobs = deferred.len(), limit = self.concurrency, "running deferred content jobs");
            let tasks: Vec<Task<JobOutput>> = deferred
                .into_iter()
                .map(|job| {
                    let ctx = self.ctx.clone();
                    Box::pin(async move {
                        let path = job.relative_path.clone();
                        tokio::task::spawn_blocking(move || job.run(&ctx))
                            .await
                            .map_err(|e| EngineError::TaskPanicked(format!("{path}: {e}")))?
                    }) as Task<JobOutput>
                })
                .collect();

            for output in run_bounded(tasks, self.concurrency).await? {
                output.merge_into(&mut outcome);
            }
        }

        Ok(outcome)
    }

    fn dest(&self, relative_path: &str) -> PathBuf {
        self.ctx.dest_dir.join(relative_path)
    }

    fn processed_dest(&self, relative_path: &str) -> Result<String, EngineError> {
        self.ctx
            .filter
            .dest_file_path(relative_path)
            .ok_or_else(|| EngineError::NoDestination {
                filter: self.ctx.filter.name().to_string(),
                relative_path: relative_path.to_string(),
            })
    }

    fn unlink(&mut self, relative_path: &str) -> Result<(), EngineError> {
        let target = if self.linked.remove(relative_path) || !self.ctx.filter.can_process_file(relative_path) {
            relative_path.to_string()
        } else {
            self.processed_dest(relative_path)?
        };
        let path = self.dest(&target);
        tolerate_missing(fs::remove_file(&path)).map_err(|source| structural(Operation::Unlink, &path, source))
    }

    fn link(&mut self, patch: &Patch) -> Result<(), EngineError> {
        let source = self.ctx.source_dir.join(&patch.path);
        let dest = self.dest(&patch.path);

        tolerate_missing(fs::remove_file(&dest)).map_err(|e| structural(patch.op, &dest, e))?;
        let linked = match self.link_mode {
            LinkMode::Symlink => symlink_or_copy(&source, &dest),
            LinkMode::Copy => fs::copy(&source, &dest).map(|_| ()),
        };
        linked.map_err(|e| structural(patch.op, &dest, e))?;

        self.linked.insert(patch.path.clone());
        Ok(())
    }
}

/// One deferred or inline transformation
#[derive(Debug)]
struct ContentJob {
    op: Operation,
    relative_path: String,
    dest_relative: String,
    force: bool,
}

struct JobOutput {
    stats: BuildStats,
    dependencies: Option<DiscoveredDependencies>,
}

impl JobOutput {
    fn merge_into(self, outcome: &mut ApplyOutcome) {
        outcome.stats.merge(&self.stats);
        outcome.dependencies.extend(self.dependencies);
    }
}

impl ContentJob {
    fn run(self, ctx: &ExecContext) -> Result<JobOutput, EngineError> {
        let mut stats = BuildStats::default();
        let filter = ctx.filter.as_ref();
        let transform_error = |source: FilterError| EngineError::Transform {
            relative_path: self.relative_path.clone(),
            source_dir: ctx.source_dir.clone(),
            source,
        };

        let contents = fs::read_to_string(ctx.source_dir.join(&self.relative_path)).map_err(|source| {
            EngineError::Read {
                relative_path: self.relative_path.clone(),
                source_dir: ctx.source_dir.clone(),
                source,
            }
        })?;

        let states = if ctx.track_dependencies {
            discover(ctx, filter, &contents, &self.relative_path)
        } else {
            Some(DependencyStates::new())
        };
        // An unknown dependency set cannot be fingerprinted; skip the cache read
        let force = self.force || states.is_none();
        let dependency_fingerprint = states
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(fingerprint);

        let request = ProcessRequest::new(&contents, &self.relative_path)
            .force(force)
            .dependency_fingerprint(dependency_fingerprint);
        let output = ctx
            .strategy
            .process_string(filter, &request, &mut stats)
            .map_err(transform_error)?;
        let output = filter
            .post_process(output, &self.relative_path)
            .map_err(transform_error)?;

        let dest = ctx.dest_dir.join(&self.dest_relative);
        if self.op == Operation::Change && unchanged(&dest, output.as_bytes()) {
            debug!(path = %self.relative_path, "output unchanged, skipping write");
            stats.unchanged_writes_skipped += 1;
        } else {
            write_output(&dest, output.as_bytes())?;
        }
        stats.record_patch(self.op);

        let dependencies = ctx.track_dependencies.then(|| DiscoveredDependencies {
            relative_path: self.relative_path.clone(),
            states,
        });
        Ok(JobOutput { stats, dependencies })
    }
}

fn discover(
    ctx: &ExecContext,
    filter: &dyn Filter,
    contents: &str,
    relative_path: &str,
) -> Option<DependencyStates> {
    let declared = match filter.dependencies(contents, relative_path) {
        Ok(declared) => declared,
        Err(e) => {
            warn!(path = relative_path, error = %e, "dependency discovery failed, keeping previous record");
            return None;
        }
    };
    match capture_states(&ctx.source_dir, &declared) {
        Ok(states) => Some(states),
        Err(e) => {
            warn!(path = relative_path, error = %e, "invalid dependency, keeping previous record");
            None
        }
    }
}

fn unchanged(dest: &Path, output: &[u8]) -> bool {
    matches!(fs::read(dest), Ok(existing) if existing == output)
}

fn write_output(dest: &Path, data: &[u8]) -> Result<(), EngineError> {
    let write_error = |source: io::Error| EngineError::Write {
        path: dest.to_path_buf(),
        source,
    };
    if let Some(parent) = dest.parent() {
        if !parent.is_dir() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
    }
    fs::write(dest, data).map_err(write_error)
}

fn structural(op: Operation, path: &Path, source: io::Error) -> EngineError {
    EngineError::Structural {
        op,
        path: path.to_path_buf(),
        source,
    }
}

fn tolerate_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn symlink_or_copy(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(not(unix))]
fn symlink_or_copy(source: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(source, dest).map(|_| ())
}
