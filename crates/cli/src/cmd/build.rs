//! Build command
//!
//! Also hosts the setup shared with `watch`: resolving the configuration,
//! taking the output lock and constructing the engine.

use crate::config::{self, SiftConfig};
use crate::filters;
use crate::locks::BuildLock;
use crate::BuildArgs;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use sift_core::{BlobStore, Operation};
use sift_engine::{BuildReport, CacheMode, Engine, EngineOptions, ExecMode};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Patches listed before the summary is truncated
const MAX_LISTED: usize = 50;

/// Load the configuration and apply command-line overrides
pub fn resolve(config_path: Option<&Path>, args: &BuildArgs) -> Result<SiftConfig> {
    let mut config = config::load(config_path).context("Failed to load configuration")?;

    if let Some(input) = &args.input {
        config.build.input = input.clone();
    }
    if let Some(output) = &args.output {
        config.build.output = output.clone();
    }
    if let Some(filter) = &args.filter {
        config.filter.name = filter.clone();
    }
    if let Some(jobs) = args.jobs {
        config.build.concurrency = Some(jobs);
        config.build.mode = ExecMode::Async;
    }
    if args.no_cache {
        config.cache.persistent = false;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Lock the output directory and construct an engine for it
///
/// The lock must outlive every build run on the returned engine.
pub fn open(config: &SiftConfig) -> Result<(Engine, BuildLock)> {
    let output = &config.build.output;
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;
    let lock = BuildLock::acquire(output)?;

    let source = config
        .build
        .input
        .canonicalize()
        .with_context(|| format!("Source directory {} not found", config.build.input.display()))?;
    let filter = filters::from_config(&config.filter, &source)?;

    let cache = if config::persistence_enabled(&config.cache) {
        let root = config::cache_root(&config.cache);
        let store = BlobStore::open(&root)
            .with_context(|| format!("Failed to open cache at {}", root.display()))?;
        info!(root = %root.display(), "using persistent cache");
        CacheMode::Persistent(Arc::new(store))
    } else {
        CacheMode::Direct
    };

    let concurrency = config
        .build
        .concurrency
        .unwrap_or_else(config::default_concurrency);
    let options = EngineOptions::new(source, output, concurrency)
        .cache(cache)
        .mode(config.build.mode)
        .link_mode(config.build.link_mode)
        .dependency_invalidation(config.build.dependency_invalidation);

    let engine = Engine::new(filter, options).context("Failed to initialize engine")?;
    Ok((engine, lock))
}

/// Run one build cycle
pub async fn run(config_path: Option<&Path>, args: &BuildArgs) -> Result<()> {
    let config = resolve(config_path, args)?;
    let (mut engine, _lock) = open(&config)?;

    let started = Instant::now();
    let report = engine.build().await.context("Build failed")?;
    print_report(&report, args.json, started.elapsed())
}

fn marker(op: Operation) -> String {
    match op {
        Operation::Mkdir => "+".blue().to_string(),
        Operation::Create => "+".green().to_string(),
        Operation::Change => "~".yellow().to_string(),
        Operation::Unlink | Operation::Rmdir => "-".red().to_string(),
    }
}

/// Print a build report, as JSON or as a colored summary
pub fn print_report(report: &BuildReport, json: bool, elapsed: Duration) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", out);
        return Ok(());
    }

    if report.patches.is_empty() {
        println!("{} {}", "✓".green(), "Up to date".dimmed());
        return Ok(());
    }

    for patch in report.patches.iter().take(MAX_LISTED) {
        let suffix = if patch.entry.is_directory() { "/" } else { "" };
        let forced = if report.invalidated.contains(&patch.path) {
            " (dependency changed)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("  {} {}{}{}", marker(patch.op), patch.path, suffix, forced);
    }
    if report.patches.len() > MAX_LISTED {
        println!(
            "  {}",
            format!("... and {} more", report.patches.len() - MAX_LISTED).dimmed()
        );
    }

    let stats = &report.stats;
    println!(
        "{} Applied {} patches in {} ms {}",
        "✓".green(),
        report.patches.len().to_string().bold(),
        elapsed.as_millis(),
        format!(
            "({} processed, {} from cache, {} linked)",
            stats.processed, stats.cache_hits, stats.linked
        )
        .dimmed()
    );
    if report.reset {
        println!("  {}", "clean build".dimmed());
    }
    if stats.cache_write_failures > 0 {
        println!(
            "  {} {} outputs could not be cached",
            "!".yellow(),
            stats.cache_write_failures
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn overrides_apply_on_top_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sift.toml");
        std::fs::write(&path, "[build]\ninput = \"site\"\n\n[filter]\nname = \"include\"\n").unwrap();

        let args = BuildArgs {
            output: Some(PathBuf::from("public")),
            filter: Some("upper".to_string()),
            jobs: Some(3),
            no_cache: true,
            ..BuildArgs::default()
        };
        let config = resolve(Some(&path), &args).unwrap();

        assert_eq!(config.build.input, PathBuf::from("site"));
        assert_eq!(config.build.output, PathBuf::from("public"));
        assert_eq!(config.filter.name, "upper");
        assert_eq!(config.build.concurrency, Some(3));
        assert_eq!(config.build.mode, ExecMode::Async);
        assert!(!config.cache.persistent);
    }

    #[test]
    fn overrides_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sift.toml");
        std::fs::write(&path, "").unwrap();

        let args = BuildArgs {
            jobs: Some(0),
            ..BuildArgs::default()
        };
        assert!(resolve(Some(&path), &args).is_err());
    }

    #[test]
    fn open_rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SiftConfig::default();
        config.build.input = dir.path().join("missing");
        config.build.output = dir.path().join("dist");
        config.cache.persistent = false;

        let err = open(&config).err().unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
