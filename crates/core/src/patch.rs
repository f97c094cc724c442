//! Patches between two snapshots
//!
//! `diff` walks both snapshots in lock-step and emits the minimal ordered
//! list of filesystem operations that turns the previous tree into the next:
//! removals first, deepest paths first, then additions and changes with every
//! directory ahead of its contents.

use crate::tree::{compare_paths, Entry, EntryKind, Snapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Filesystem operation carried by a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a directory
    Mkdir,
    /// Remove a directory
    Rmdir,
    /// Remove a file
    Unlink,
    /// Add a file
    Create,
    /// Rewrite a file
    Change,
}

impl Operation {
    /// Whether this operation removes something from the tree
    pub fn is_removal(self) -> bool {
        matches!(self, Operation::Rmdir | Operation::Unlink)
    }

    /// Whether this operation produces file content
    pub fn is_content(self) -> bool {
        matches!(self, Operation::Create | Operation::Change)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Mkdir => "mkdir",
            Operation::Rmdir => "rmdir",
            Operation::Unlink => "unlink",
            Operation::Create => "create",
            Operation::Change => "change",
        })
    }
}

/// One structural or content operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// What to do
    pub op: Operation,
    /// Relative path the operation applies to
    pub path: String,
    /// Next entry for additions and changes, removed entry for removals
    pub entry: Entry,
}

impl Patch {
    /// Build a patch for an entry, taking the path from it
    pub fn new(op: Operation, entry: Entry) -> Self {
        Self {
            op,
            path: entry.path.clone(),
            entry,
        }
    }
}

fn removal(entry: &Entry) -> Patch {
    let op = match entry.kind {
        EntryKind::Directory => Operation::Rmdir,
        EntryKind::File => Operation::Unlink,
    };
    Patch::new(op, entry.clone())
}

fn addition(entry: &Entry) -> Patch {
    let op = match entry.kind {
        EntryKind::Directory => Operation::Mkdir,
        EntryKind::File => Operation::Create,
    };
    Patch::new(op, entry.clone())
}

/// Compute the ordered patch list from `previous` to `next`
///
/// Runs in time linear in the combined entry count. Returns an empty list
/// when the trees are identical.
pub fn diff(previous: &Snapshot, next: &Snapshot) -> Vec<Patch> {
    let prev = previous.entries();
    let curr = next.entries();

    let mut removals = Vec::new();
    let mut additions = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < prev.len() || j < curr.len() {
        let ordering = match (prev.get(i), curr.get(j)) {
            (Some(a), Some(b)) => compare_paths(&a.path, &b.path),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };

        match ordering {
            Ordering::Less => {
                removals.push(removal(&prev[i]));
                i += 1;
            }
            Ordering::Greater => {
                additions.push(addition(&curr[j]));
                j += 1;
            }
            Ordering::Equal => {
                let (old, new) = (&prev[i], &curr[j]);
                if old.kind != new.kind {
                    removals.push(removal(old));
                    additions.push(addition(new));
                } else if new.kind == EntryKind::File && old.metadata != new.metadata {
                    additions.push(Patch::new(Operation::Change, new.clone()));
                }
                i += 1;
                j += 1;
            }
        }
    }

    removals.reverse();
    removals.extend(additions);
    removals
}

/// Check the ordering invariant of a patch list
///
/// Every `mkdir` of a directory precedes any addition beneath it, and every
/// removal beneath a path precedes the removal of the path itself.
pub fn is_ordered(patches: &[Patch]) -> bool {
    let mut created_dirs: HashSet<&str> = HashSet::new();
    let mut removed: HashSet<&str> = HashSet::new();
    let mut pending_mkdirs: HashSet<&str> = patches
        .iter()
        .filter(|p| p.op == Operation::Mkdir)
        .map(|p| p.path.as_str())
        .collect();

    for patch in patches {
        let mut ancestor = patch.entry.parent();
        while let Some(dir) = ancestor {
            if patch.op.is_removal() {
                if removed.contains(dir) {
                    return false;
                }
            } else if pending_mkdirs.contains(dir) && !created_dirs.contains(dir) {
                return false;
            }
            ancestor = dir.rsplit_once('/').map(|(parent, _)| parent);
        }

        match patch.op {
            Operation::Mkdir => {
                created_dirs.insert(&patch.path);
                pending_mkdirs.remove(patch.path.as_str());
            }
            Operation::Rmdir | Operation::Unlink => {
                removed.insert(&patch.path);
            }
            _ => {}
        }
    }
    true
}
