//! Folding dependency-invalidated files into a diff

use sift_core::tree::compare_paths;
use sift_core::{Operation, Patch, Snapshot};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// Add `change`/`create` patches for invalidated files
///
/// Files already patched by the diff are left alone, as are files that no
/// longer exist in `next` and paths that are directories. Returned patches
/// keep the diff's ordering: removals first, then additions and changes, with
/// the extra patches merged into the second section by path.
pub fn merge_invalidations(
    invalidated: &BTreeSet<String>,
    previous: &Snapshot,
    next: &Snapshot,
    patches: Vec<Patch>,
) -> Vec<Patch> {
    if invalidated.is_empty() {
        return patches;
    }

    let touched: HashSet<&str> = patches.iter().map(|p| p.path.as_str()).collect();

    // BTreeSet iteration is lexicographic; the patch order is component-wise
    let mut extra: Vec<Patch> = invalidated
        .iter()
        .filter(|path| !touched.contains(path.as_str()))
        .filter_map(|path| {
            let entry = next.get(path)?;
            if entry.is_directory() {
                return None;
            }
            let op = if previous.contains(path) {
                Operation::Change
            } else {
                Operation::Create
            };
            Some(Patch::new(op, entry.clone()))
        })
        .collect();

    if extra.is_empty() {
        return patches;
    }
    extra.sort_by(|a, b| compare_paths(&a.path, &b.path));

    let split = patches.iter().take_while(|p| p.op.is_removal()).count();
    let mut merged = Vec::with_capacity(patches.len() + extra.len());
    let mut rest = patches.into_iter();
    merged.extend(rest.by_ref().take(split));

    let mut extra = extra.into_iter().peekable();
    for patch in rest {
        while let Some(e) = extra.next_if(|e| compare_paths(&e.path, &patch.path) == Ordering::Less) {
            merged.push(e);
        }
        merged.push(patch);
    }
    merged.extend(extra);
    merged
}
