//! Project fixtures: a scratch directory with `src/`, `dist/` and a cache

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join("src")).expect("Failed to create src");
        Self { temp_dir }
    }

    /// Project root, used as the working directory of every command
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Cache directory to pass as `SIFT_CACHE_ROOT`
    pub fn cache_root(&self) -> PathBuf {
        self.root().join("cache")
    }

    pub fn cache_env(&self) -> String {
        self.cache_root().display().to_string()
    }

    /// Write a file relative to the project root
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, contents).expect("Failed to write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).expect("Failed to read file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root().join(rel).exists()
    }
}
