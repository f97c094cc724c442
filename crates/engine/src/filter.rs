//! The transformation capability and path-mapping rule
//!
//! A [`Filter`] turns the text of one input file into the text of one output
//! file. Only `name`, `base_dir` and `process_string` are mandatory; the
//! remaining hooks default to the behavior described on each method.

use crate::error::{EngineError, FilterError};
use serde::{Deserialize, Serialize};
use sift_core::{Blake3Hash, IncrementalHasher};
use std::path::Path;

/// Maps source paths to destination paths by extension
///
/// With no `extensions`, every path is accepted and kept as-is. Otherwise a
/// path is accepted when it ends in `.<ext>` for one of the extensions (first
/// match wins) and, if `target_extension` is set, that suffix is replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapper {
    /// Accepted source suffixes, without the leading dot
    pub extensions: Option<Vec<String>>,
    /// Suffix substituted on output, without the leading dot
    pub target_extension: Option<String>,
}

impl PathMapper {
    /// Create a mapper
    pub fn new(extensions: Option<Vec<String>>, target_extension: Option<String>) -> Self {
        Self {
            extensions,
            target_extension,
        }
    }

    /// Accept only the given extensions, keeping them on output
    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(extensions.into_iter().map(Into::into).collect()), None)
    }

    /// Replace the matched extension with `target` on output
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_extension = Some(target.into());
        self
    }

    /// Destination path for `relative_path`, or `None` if it is not eligible
    pub fn dest_path(&self, relative_path: &str) -> Option<String> {
        let Some(extensions) = &self.extensions else {
            return Some(relative_path.to_string());
        };

        extensions.iter().find_map(|ext| {
            let stem = relative_path.strip_suffix(ext.as_str())?.strip_suffix('.')?;
            Some(match &self.target_extension {
                Some(target) => format!("{stem}.{target}"),
                None => relative_path.to_string(),
            })
        })
    }

    /// Check that every extension is a non-empty suffix without a leading dot
    pub fn validate(&self) -> Result<(), String> {
        let bad = |ext: &str| ext.is_empty() || ext.starts_with('.') || ext.contains('/');
        if let Some(extensions) = &self.extensions {
            if let Some(ext) = extensions.iter().find(|e| bad(e)) {
                return Err(format!("invalid extension {ext:?}"));
            }
        }
        match &self.target_extension {
            Some(target) if bad(target) => Err(format!("invalid target extension {target:?}")),
            _ => Ok(()),
        }
    }
}

/// A per-file text transformation
pub trait Filter: Send + Sync {
    /// Human-readable name, used in logs and errors
    fn name(&self) -> &str;

    /// Directory the filter's own code lives in
    ///
    /// Folded into [`Filter::cache_key`] so that cached output is not shared
    /// between different filters.
    fn base_dir(&self) -> &Path;

    /// Transform one file's contents
    fn process_string(&self, contents: &str, relative_path: &str) -> Result<String, FilterError>;

    /// Path-mapping rule; `None` accepts every file under its own name
    fn path_mapper(&self) -> Option<&PathMapper> {
        None
    }

    /// Destination for a source path, or `None` to link the file verbatim
    fn dest_file_path(&self, relative_path: &str) -> Option<String> {
        match self.path_mapper() {
            Some(mapper) => mapper.dest_path(relative_path),
            None => Some(relative_path.to_string()),
        }
    }

    /// Whether the file goes through `process_string`
    fn can_process_file(&self, relative_path: &str) -> bool {
        self.dest_file_path(relative_path).is_some()
    }

    /// Fingerprint of the filter itself
    ///
    /// Read once when the engine is built. Override to fold in external state
    /// such as a tool version.
    fn cache_key(&self) -> Blake3Hash {
        default_cache_key(self.name(), self.base_dir())
    }

    /// Per-file cache key
    fn cache_key_process_string(&self, contents: &str, relative_path: &str) -> String {
        let mut hasher = IncrementalHasher::new();
        hasher.part(contents.as_bytes()).part(relative_path.as_bytes());
        hasher.finalize().to_hex()
    }

    /// Runs on every output, including outputs served from the cache
    fn post_process(&self, output: String, _relative_path: &str) -> Result<String, FilterError> {
        Ok(output)
    }

    /// Extra files this file's output depends on
    ///
    /// Paths are relative to the source directory, or absolute for files
    /// outside it. Only consulted when dependency invalidation is enabled.
    fn dependencies(&self, _contents: &str, _relative_path: &str) -> Result<Vec<String>, FilterError> {
        Ok(Vec::new())
    }
}

/// Default filter fingerprint: name, base directory and its `Cargo.toml`
pub fn default_cache_key(name: &str, base_dir: &Path) -> Blake3Hash {
    let manifest = std::fs::read(base_dir.join("Cargo.toml")).unwrap_or_default();
    let mut hasher = IncrementalHasher::new();
    hasher
        .part(name.as_bytes())
        .part(base_dir.to_string_lossy().as_bytes())
        .part(&manifest);
    hasher.finalize()
}

/// Reject filters that cannot be driven by the engine
pub fn validate_filter(filter: &dyn Filter) -> Result<(), EngineError> {
    if filter.name().trim().is_empty() {
        return Err(EngineError::InvalidFilter("filter name is empty".to_string()));
    }
    if filter.base_dir().as_os_str().is_empty() {
        return Err(EngineError::InvalidFilter(format!(
            "filter {} has an empty base_dir",
            filter.name()
        )));
    }
    if let Some(mapper) = filter.path_mapper() {
        mapper
            .validate()
            .map_err(|e| EngineError::InvalidFilter(format!("filter {}: {e}", filter.name())))?;
    }
    Ok(())
}
