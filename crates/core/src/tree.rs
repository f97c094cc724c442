//! Tree snapshots: ordered, immutable views of a directory tree

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Type of tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Change-detection token for an entry
///
/// Never used as content identity: two files with equal metadata may still
/// differ, and the cache keys on content instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Size in bytes
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: u64,
    /// Unix permission bits (0 on other platforms)
    pub mode: u32,
}

impl Metadata {
    /// Build a token from filesystem metadata
    pub fn from_fs(meta: &std::fs::Metadata) -> Self {
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            size: meta.len(),
            mtime_ns,
            mode: mode_bits(meta),
        }
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(_meta: &std::fs::Metadata) -> u32 {
    0
}

/// One path in a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Relative path with `/` separators
    pub path: String,
    /// Kind of entry
    pub kind: EntryKind,
    /// Opaque change token
    pub metadata: Metadata,
}

impl Entry {
    /// Create a new file entry
    pub fn file(path: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            metadata,
        }
    }

    /// Create a new directory entry
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            metadata: Metadata::default(),
        }
    }

    /// Whether this entry is a directory
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Parent directory path, if the entry is not at the root
    pub fn parent(&self) -> Option<&str> {
        self.path.rsplit_once('/').map(|(parent, _)| parent)
    }
}

/// Errors raised while building or scanning a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A path appeared more than once
    #[error("duplicate path in snapshot: {0}")]
    Duplicate(String),

    /// A path's parent directory has no entry
    #[error("{path} has no parent directory entry {parent}")]
    MissingParent {
        /// The orphaned path
        path: String,
        /// The parent that should precede it
        parent: String,
    },

    /// A path's parent is a file
    #[error("{path} is nested under file {parent}")]
    ParentNotDirectory {
        /// The nested path
        path: String,
        /// The file it is nested under
        parent: String,
    },

    /// The path is empty, absolute, or escapes its root
    #[error("invalid relative path: {0:?}")]
    InvalidPath(String),

    /// Directory traversal failed
    #[error("failed to walk {root}: {source}")]
    Walk {
        /// Tree being scanned
        root: String,
        /// Underlying walk error
        source: walkdir::Error,
    },
}

/// Component-wise path ordering
///
/// A directory sorts before everything beneath it, and its whole subtree
/// sorts before any sibling that follows it.
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    a.split('/').cmp(b.split('/'))
}

/// Ordered, immutable view of a tree at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// The empty tree
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from unordered entries
    ///
    /// Rejects duplicate paths and entries whose parent directory is absent
    /// or is a file.
    pub fn from_entries(mut entries: Vec<Entry>) -> Result<Self, SnapshotError> {
        for entry in &entries {
            if normalize_path(Path::new(&entry.path))? != entry.path {
                return Err(SnapshotError::InvalidPath(entry.path.clone()));
            }
        }

        entries.sort_by(|a, b| compare_paths(&a.path, &b.path));

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if let Some(parent) = entry.parent() {
                match index.get(parent).map(|&j: &usize| entries[j].kind) {
                    Some(EntryKind::Directory) => {}
                    Some(EntryKind::File) => {
                        return Err(SnapshotError::ParentNotDirectory {
                            path: entry.path.clone(),
                            parent: parent.to_string(),
                        })
                    }
                    None => {
                        return Err(SnapshotError::MissingParent {
                            path: entry.path.clone(),
                            parent: parent.to_string(),
                        })
                    }
                }
            }
            if index.insert(entry.path.clone(), i).is_some() {
                return Err(SnapshotError::Duplicate(entry.path.clone()));
            }
        }

        Ok(Self { entries, index })
    }

    /// Enumerate a directory tree
    ///
    /// Symlinks are followed; anything that is neither a file nor a directory
    /// after following is skipped.
    pub fn scan(root: &Path) -> Result<Self, SnapshotError> {
        let mut entries = Vec::new();

        for item in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .min_depth(1)
        {
            let item = item.map_err(|source| SnapshotError::Walk {
                root: root.display().to_string(),
                source,
            })?;

            let rel = item
                .path()
                .strip_prefix(root)
                .map_err(|_| SnapshotError::InvalidPath(item.path().display().to_string()))?;
            let path = normalize_path(rel)?;

            let file_type = item.file_type();
            if file_type.is_dir() {
                entries.push(Entry::directory(path));
            } else if file_type.is_file() {
                let meta = item.metadata().map_err(|source| SnapshotError::Walk {
                    root: root.display().to_string(),
                    source,
                })?;
                entries.push(Entry::file(path, Metadata::from_fs(&meta)));
            }
        }

        Self::from_entries(entries)
    }

    /// Look up an entry by relative path
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Whether the path is present
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Entries in order
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Entries as a slice
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Get the number of entries in the snapshot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize a relative path for use as a snapshot key
///
/// - Converts to `/` separators
/// - Rejects `..`, absolute and empty paths
/// - Removes `./` components
pub fn normalize_path(path: &Path) -> Result<String, SnapshotError> {
    let invalid = || SnapshotError::InvalidPath(path.display().to_string());
    let mut parts = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }

    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}
