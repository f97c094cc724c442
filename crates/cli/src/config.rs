//! `sift.toml` loading, validation and environment-derived defaults
//!
//! Every section is optional; a missing file yields [`SiftConfig::default`].
//! Environment lookups live here rather than in the engine so that the
//! engine only ever sees explicit values.

use serde::{Deserialize, Serialize};
use sift_engine::{ExecMode, LinkMode, PathMapper};
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "sift.toml";

/// Filters compiled into the binary
pub const KNOWN_FILTERS: [&str; 2] = ["upper", "include"];

/// Errors that can occur when loading or validating `sift.toml`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiftConfig {
    pub build: BuildSection,
    pub cache: CacheSection,
    pub filter: FilterSection,
}

/// `[build]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: ExecMode,
    /// Content operations in flight; unset means [`default_concurrency`]
    pub concurrency: Option<usize>,
    pub link_mode: LinkMode,
    pub dependency_invalidation: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            input: PathBuf::from("src"),
            output: PathBuf::from("dist"),
            mode: ExecMode::Sync,
            concurrency: None,
            link_mode: LinkMode::Symlink,
            dependency_invalidation: true,
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub persistent: bool,
    /// Cache directory; `SIFT_CACHE_ROOT` takes precedence
    pub root: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            persistent: true,
            root: None,
        }
    }
}

/// `[filter]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSection {
    pub name: String,
    pub extensions: Option<Vec<String>>,
    pub target_extension: Option<String>,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            name: "upper".to_string(),
            extensions: None,
            target_extension: None,
        }
    }
}

impl FilterSection {
    /// Path mapper described by this section, if any extension is configured
    pub fn mapper(&self) -> Option<PathMapper> {
        if self.extensions.is_none() && self.target_extension.is_none() {
            return None;
        }
        Some(PathMapper::new(
            self.extensions.clone(),
            self.target_extension.clone(),
        ))
    }
}

impl SiftConfig {
    /// Check ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(n) = self.build.concurrency {
            if !(1..=256).contains(&n) {
                return Err(ConfigError::Validation(format!(
                    "build.concurrency must be between 1 and 256, got {n}"
                )));
            }
        }
        if self.build.input.as_os_str().is_empty() {
            return Err(ConfigError::Validation("build.input is empty".to_string()));
        }
        if self.build.output.as_os_str().is_empty() {
            return Err(ConfigError::Validation("build.output is empty".to_string()));
        }
        if self.build.input == self.build.output {
            return Err(ConfigError::Validation(
                "build.input and build.output are the same directory".to_string(),
            ));
        }
        if !KNOWN_FILTERS.contains(&self.filter.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown filter '{}' (expected one of: {})",
                self.filter.name,
                KNOWN_FILTERS.join(", ")
            )));
        }
        if let Some(mapper) = self.filter.mapper() {
            mapper
                .validate()
                .map_err(|e| ConfigError::Validation(format!("filter: {e}")))?;
        }
        Ok(())
    }
}

/// Load the configuration
///
/// An explicit path must exist. Without one, `sift.toml` in the working
/// directory is used when present and defaults otherwise.
pub fn load(path: Option<&Path>) -> Result<SiftConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = PathBuf::from(CONFIG_FILE_NAME);
            if !candidate.exists() {
                return Ok(SiftConfig::default());
            }
            candidate
        }
    };
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    load_from_str(&content)
}

/// Parse and validate configuration text
pub fn load_from_str(content: &str) -> Result<SiftConfig, ConfigError> {
    let config: SiftConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Annotated example configuration
pub fn example_config() -> &'static str {
    r#"# sift.toml

[build]
# Source tree, read but never written
input = "src"
# Output tree, owned by sift and wiped after a failed build
output = "dist"
# "sync" or "async"
mode = "sync"
# Content operations in flight in async mode (1-256).
# Defaults to $JOBS, else the number of CPUs minus one.
# concurrency = 4
# "symlink" or "copy" for files the filter does not process
link_mode = "symlink"
# Reprocess files whose declared dependencies changed
dependency_invalidation = true

[cache]
# Keep filter output across runs. Disabled when $CI is set
# unless $FORCE_PERSISTENCE_IN_CI is also set.
persistent = true
# Defaults to $SIFT_CACHE_ROOT, else the user cache directory
# root = ".sift-cache"

[filter]
# "upper" or "include"
name = "include"
extensions = ["html", "txt"]
# target_extension = "out"
"#
}

/// Concurrency when none is configured
///
/// `JOBS` wins when it parses to a positive number; otherwise one less than
/// the available parallelism, never below one.
pub fn default_concurrency() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    concurrency_from(std::env::var("JOBS").ok().as_deref(), available)
}

fn concurrency_from(jobs: Option<&str>, available: usize) -> usize {
    match jobs.and_then(|j| j.trim().parse::<usize>().ok()) {
        Some(n) if n > 0 => n,
        _ => available.saturating_sub(1).max(1),
    }
}

/// Directory holding persisted filter output
pub fn cache_root(section: &CacheSection) -> PathBuf {
    let env = std::env::var_os("SIFT_CACHE_ROOT").map(PathBuf::from);
    cache_root_from(env, section, dirs::cache_dir())
}

fn cache_root_from(env: Option<PathBuf>, section: &CacheSection, user_cache: Option<PathBuf>) -> PathBuf {
    env.filter(|p| !p.as_os_str().is_empty())
        .or_else(|| section.root.clone())
        .or_else(|| user_cache.map(|d| d.join("sift")))
        .unwrap_or_else(|| PathBuf::from(".sift-cache"))
}

/// Whether builds should use the persistent cache
pub fn persistence_enabled(section: &CacheSection) -> bool {
    persistence_from(
        section,
        std::env::var_os("CI").is_some(),
        std::env::var_os("FORCE_PERSISTENCE_IN_CI").is_some(),
    )
}

fn persistence_from(section: &CacheSection, ci: bool, forced: bool) -> bool {
    section.persistent && (!ci || forced)
}
