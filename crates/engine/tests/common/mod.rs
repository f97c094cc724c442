//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use filetime::FileTime;
use sift_engine::{Filter, FilterError, PathMapper};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_MTIME: AtomicI64 = AtomicI64::new(1_600_000_000);

/// Source and output directories in a scratch location
pub struct Fixture {
    _tmp: tempfile::TempDir,
    pub src: PathBuf,
    pub out: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let out = tmp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        Self { _tmp: tmp, src, out }
    }

    /// Scratch path outside both trees
    pub fn scratch(&self, name: &str) -> PathBuf {
        self._tmp.path().join(name)
    }

    /// Write a source file with a fresh mtime, creating parents
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.src.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        bump_mtime(&path);
    }

    pub fn remove(&self, rel: &str) {
        let path = self.src.join(rel);
        if path.is_dir() {
            fs::remove_dir_all(path).unwrap();
        } else {
            fs::remove_file(path).unwrap();
        }
    }

    pub fn read_out(&self, rel: &str) -> String {
        fs::read_to_string(self.out.join(rel)).unwrap()
    }

    pub fn src_tree(&self) -> BTreeMap<String, Option<String>> {
        tree_contents(&self.src)
    }

    pub fn out_tree(&self) -> BTreeMap<String, Option<String>> {
        tree_contents(&self.out)
    }
}

/// Give a file an mtime no other write in this process has used
pub fn bump_mtime(path: &Path) {
    let secs = NEXT_MTIME.fetch_add(1, Ordering::SeqCst);
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// Relative path -> file contents (`None` for directories)
pub fn tree_contents(root: &Path) -> BTreeMap<String, Option<String>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Option<String>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_dir() {
                out.insert(rel, None);
                walk(root, &path, out);
            } else {
                out.insert(rel, Some(fs::read_to_string(&path).unwrap()));
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

/// Uppercasing filter with call and concurrency counters
pub struct Upper {
    base: PathBuf,
    mapper: Option<PathMapper>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Upper {
    pub fn new() -> Self {
        Self {
            base: PathBuf::from("/filters/upper"),
            mapper: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn mapper(mut self, mapper: PathMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Filter for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    fn base_dir(&self) -> &Path {
        &self.base
    }

    fn path_mapper(&self) -> Option<&PathMapper> {
        self.mapper.as_ref()
    }

    fn process_string(&self, contents: &str, relative_path: &str) -> Result<String, FilterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if contents.contains("FAIL") {
            return Err(format!("cannot process {relative_path}").into());
        }
        Ok(contents.to_uppercase())
    }
}

/// Replaces `dep:<path>` lines with the contents of `<path>`
pub struct Splice {
    base: PathBuf,
    source: PathBuf,
    pub calls: AtomicUsize,
}

impl Splice {
    pub fn new(source: &Path) -> Arc<Self> {
        Arc::new(Self {
            base: PathBuf::from("/filters/splice"),
            source: source.to_path_buf(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn targets(contents: &str) -> impl Iterator<Item = &str> {
        contents.lines().filter_map(|l| l.strip_prefix("dep:"))
    }

    fn resolve(&self, dep: &str) -> PathBuf {
        if Path::new(dep).is_absolute() {
            PathBuf::from(dep)
        } else {
            self.source.join(dep)
        }
    }
}

impl Filter for Splice {
    fn name(&self) -> &str {
        "splice"
    }

    fn base_dir(&self) -> &Path {
        &self.base
    }

    fn path_mapper(&self) -> Option<&PathMapper> {
        None
    }

    fn can_process_file(&self, relative_path: &str) -> bool {
        relative_path.ends_with(".txt")
    }

    fn process_string(&self, contents: &str, _relative_path: &str) -> Result<String, FilterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = String::new();
        for line in contents.lines() {
            match line.strip_prefix("dep:") {
                Some(dep) => out.push_str(fs::read_to_string(self.resolve(dep))?.trim_end()),
                None => out.push_str(line),
            }
            out.push('\n');
        }
        Ok(out)
    }

    fn dependencies(&self, contents: &str, _relative_path: &str) -> Result<Vec<String>, FilterError> {
        Ok(Self::targets(contents).map(str::to_string).collect())
    }
}
