//! Filters compiled into the `sift` binary

use crate::config::FilterSection;
use anyhow::{bail, Result};
use sift_engine::{Filter, FilterError, PathMapper};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Directory of this crate; its `Cargo.toml` versions every built-in filter
fn base_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Build the filter named in `[filter]` for a canonical source directory
pub fn from_config(section: &FilterSection, source_dir: &Path) -> Result<Arc<dyn Filter>> {
    let mapper = section.mapper();
    let filter: Arc<dyn Filter> = match section.name.as_str() {
        "upper" => Arc::new(UpperFilter::new(mapper)),
        "include" => Arc::new(IncludeFilter::new(source_dir, mapper)),
        other => bail!("unknown filter '{}'", other),
    };
    Ok(filter)
}

/// Uppercases text
pub struct UpperFilter {
    base: PathBuf,
    mapper: Option<PathMapper>,
}

impl UpperFilter {
    pub fn new(mapper: Option<PathMapper>) -> Self {
        Self {
            base: base_dir(),
            mapper,
        }
    }
}

impl Filter for UpperFilter {
    fn name(&self) -> &str {
        "upper"
    }

    fn base_dir(&self) -> &Path {
        &self.base
    }

    fn path_mapper(&self) -> Option<&PathMapper> {
        self.mapper.as_ref()
    }

    fn process_string(&self, contents: &str, _relative_path: &str) -> Result<String, FilterError> {
        Ok(contents.to_uppercase())
    }
}

/// Expands `@include "path"` lines with the named file's contents
///
/// Paths are relative to the source directory unless absolute. Expansion is
/// one level deep; directives inside included files are copied verbatim.
/// Every included file is declared as a dependency.
pub struct IncludeFilter {
    base: PathBuf,
    source_dir: PathBuf,
    mapper: Option<PathMapper>,
}

impl IncludeFilter {
    pub fn new(source_dir: &Path, mapper: Option<PathMapper>) -> Self {
        Self {
            base: base_dir(),
            source_dir: source_dir.to_path_buf(),
            mapper,
        }
    }

    fn resolve(&self, target: &str) -> PathBuf {
        let path = Path::new(target);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.source_dir.join(path)
        }
    }

    /// Dependency path for an include target
    ///
    /// Targets inside the source directory stay relative to it. Anything
    /// that leaves it, `..` included, is declared as a clean absolute path.
    fn declared(&self, target: &str) -> String {
        let mut resolved = PathBuf::new();
        for component in self.resolve(target).components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => resolved.push(other),
            }
        }
        match resolved.strip_prefix(&self.source_dir) {
            Ok(inner) if !inner.as_os_str().is_empty() => inner
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            _ => resolved.to_string_lossy().into_owned(),
        }
    }
}

/// Target of an include directive, if the line is one
fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("@include")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.trim().strip_prefix('"')?.strip_suffix('"')
}

impl Filter for IncludeFilter {
    fn name(&self) -> &str {
        "include"
    }

    fn base_dir(&self) -> &Path {
        &self.base
    }

    fn path_mapper(&self) -> Option<&PathMapper> {
        self.mapper.as_ref()
    }

    fn process_string(&self, contents: &str, relative_path: &str) -> Result<String, FilterError> {
        let mut out = String::with_capacity(contents.len());
        for line in contents.split_inclusive('\n') {
            let Some(target) = include_target(line) else {
                out.push_str(line);
                continue;
            };
            let included = std::fs::read_to_string(self.resolve(target))
                .map_err(|e| format!("{relative_path}: cannot include \"{target}\": {e}"))?;
            out.push_str(&included);
            if line.ends_with('\n') && !included.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(out)
    }

    fn dependencies(&self, contents: &str, _relative_path: &str) -> Result<Vec<String>, FilterError> {
        Ok(contents
            .lines()
            .filter_map(include_target)
            .map(|target| self.declared(target))
            .collect())
    }
}
