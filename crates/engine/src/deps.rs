//! Dependency tracking for forced invalidation
//!
//! Records, per processed file, the extra files its output was built from,
//! together with each dependency's content state. A tracked file whose
//! dependency state has since changed is reported by
//! [`Dependencies::invalidated_files`] even though the file itself is unchanged.

use serde::{Deserialize, Serialize};
use sift_core::{hash_file, normalize_path, Blake3Hash, IncrementalHasher, SnapshotError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Content state of one dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyState {
    /// File content hash
    Hash(Blake3Hash),
    /// The dependency did not exist or could not be read
    Missing,
}

/// Dependency paths resolved to their current states
pub type DependencyStates = BTreeMap<String, DependencyState>;

/// Errors raised while recording dependencies
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// The tracker was sealed for the previous cycle
    #[error("dependencies are sealed; derive a working copy with without_files")]
    Sealed,

    /// A declared dependency path is unusable
    #[error("invalid dependency path: {0}")]
    InvalidPath(#[from] SnapshotError),
}

/// Normalize one declared dependency path
///
/// Absolute paths are kept; relative paths are taken relative to the source
/// directory and may not escape it.
pub fn normalize_dependency(dep: &str) -> Result<String, DependencyError> {
    let path = Path::new(dep);
    if path.is_absolute() {
        return Ok(dep.to_string());
    }
    Ok(normalize_path(path)?)
}

/// Current state of a dependency
pub fn dependency_state(source_root: &Path, dep: &str) -> DependencyState {
    match hash_file(&resolve(source_root, dep)) {
        Ok(hash) => DependencyState::Hash(hash),
        Err(_) => DependencyState::Missing,
    }
}

/// Normalize declared dependencies and capture their current states
pub fn capture_states<I, S>(source_root: &Path, deps: I) -> Result<DependencyStates, DependencyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    deps.into_iter()
        .map(|dep| {
            let dep = normalize_dependency(dep.as_ref())?;
            let state = dependency_state(source_root, &dep);
            Ok((dep, state))
        })
        .collect()
}

/// Stable digest of a set of dependency states, for cache keys
pub fn fingerprint(states: &DependencyStates) -> Blake3Hash {
    let mut hasher = IncrementalHasher::new();
    for (dep, state) in states {
        hasher.part(dep.as_bytes());
        match state {
            DependencyState::Hash(hash) => hasher.part(hash.as_bytes()),
            DependencyState::Missing => hasher.part(b"missing"),
        };
    }
    hasher.finalize()
}

fn resolve(source_root: &Path, dep: &str) -> PathBuf {
    let path = Path::new(dep);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        source_root.join(path)
    }
}

/// Per-file dependency records
///
/// A tracker is sealed at the end of every successful cycle. A sealed
/// tracker is read-only; the next cycle works on a copy obtained from
/// [`Dependencies::without_files`], so the sealed one stays valid if that
/// cycle fails.
#[derive(Debug, Clone)]
pub struct Dependencies {
    source_root: PathBuf,
    /// file -> dependencies
    records: BTreeMap<String, BTreeSet<String>>,
    /// dependency -> state at the time its dependents were last processed
    states: DependencyStates,
    sealed: bool,
}

impl Dependencies {
    /// Create an empty, unsealed tracker
    pub fn new(source_root: &Path) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            records: BTreeMap::new(),
            states: BTreeMap::new(),
            sealed: false,
        }
    }

    /// Whether the tracker has been sealed
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of files with recorded dependencies
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no file has recorded dependencies
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recorded dependencies of a file
    pub fn dependencies_of(&self, file: &str) -> Option<&BTreeSet<String>> {
        self.records.get(file)
    }

    /// Replace a file's dependencies; states are captured when sealing
    pub fn set_dependencies<I, S>(&mut self, file: &str, deps: I) -> Result<(), DependencyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.sealed {
            return Err(DependencyError::Sealed);
        }
        let deps = deps
            .into_iter()
            .map(|d| normalize_dependency(d.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        for dep in &deps {
            self.states.remove(dep);
        }
        self.store(file, deps);
        Ok(())
    }

    /// Replace a file's dependencies with states captured while processing it
    pub fn record(&mut self, file: &str, states: DependencyStates) -> Result<(), DependencyError> {
        if self.sealed {
            return Err(DependencyError::Sealed);
        }
        let deps = states.keys().cloned().collect();
        self.states.extend(states);
        self.store(file, deps);
        Ok(())
    }

    fn store(&mut self, file: &str, deps: BTreeSet<String>) {
        if deps.is_empty() {
            self.records.remove(file);
        } else {
            self.records.insert(file.to_string(), deps);
        }
    }

    /// Commit this cycle's records
    ///
    /// Dependencies without a captured state are hashed now; states for
    /// dependencies nothing refers to any more are dropped.
    pub fn seal(&mut self) {
        let live: BTreeSet<&String> = self.records.values().flatten().collect();
        self.states.retain(|dep, _| live.contains(dep));

        let missing: Vec<String> = live
            .into_iter()
            .filter(|dep| !self.states.contains_key(*dep))
            .cloned()
            .collect();
        for dep in missing {
            let state = dependency_state(&self.source_root, &dep);
            self.states.insert(dep, state);
        }
        self.sealed = true;
    }

    /// Tracked files whose dependencies changed since they were recorded
    pub fn invalidated_files(&self) -> BTreeSet<String> {
        let changed: BTreeSet<&String> = self
            .states
            .iter()
            .filter(|(dep, state)| dependency_state(&self.source_root, dep) != **state)
            .map(|(dep, _)| dep)
            .collect();

        if changed.is_empty() {
            return BTreeSet::new();
        }

        self.records
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| changed.contains(d)))
            .map(|(file, _)| file.clone())
            .collect()
    }

    /// Unsealed copy without the records of `removed` files
    pub fn without_files<S: AsRef<str>>(&self, removed: &[S]) -> Self {
        let mut next = self.clone();
        for file in removed {
            next.records.remove(file.as_ref());
        }
        next.sealed = false;
        next
    }
}
