//! Per-cycle counters

use serde::{Deserialize, Serialize};
use sift_core::Operation;

/// Counters collected during one build cycle
///
/// Each content task fills its own instance; the executor merges them once
/// every task has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub mkdirs: u64,
    pub rmdirs: u64,
    pub unlinks: u64,
    pub creates: u64,
    pub changes: u64,
    /// Calls into `Filter::process_string`
    pub processed: u64,
    /// Files linked or copied verbatim
    pub linked: u64,
    pub cache_hits: u64,
    /// Outputs written to the persistent cache
    pub cache_primes: u64,
    pub cache_write_failures: u64,
    /// Changes whose output matched the existing destination
    pub unchanged_writes_skipped: u64,
    /// Files processed with the cache read bypassed
    pub forced: u64,
}

impl BuildStats {
    /// Count one applied patch
    pub fn record_patch(&mut self, op: Operation) {
        match op {
            Operation::Mkdir => self.mkdirs += 1,
            Operation::Rmdir => self.rmdirs += 1,
            Operation::Unlink => self.unlinks += 1,
            Operation::Create => self.creates += 1,
            Operation::Change => self.changes += 1,
        }
    }

    /// Add another instance's counters into this one
    pub fn merge(&mut self, other: &BuildStats) {
        self.mkdirs += other.mkdirs;
        self.rmdirs += other.rmdirs;
        self.unlinks += other.unlinks;
        self.creates += other.creates;
        self.changes += other.changes;
        self.processed += other.processed;
        self.linked += other.linked;
        self.cache_hits += other.cache_hits;
        self.cache_primes += other.cache_primes;
        self.cache_write_failures += other.cache_write_failures;
        self.unchanged_writes_skipped += other.unchanged_writes_skipped;
        self.forced += other.forced;
    }

    /// Total number of patches applied
    pub fn patch_count(&self) -> u64 {
        self.mkdirs + self.rmdirs + self.unlinks + self.creates + self.changes
    }
}
