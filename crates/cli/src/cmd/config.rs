//! Configuration inspection command

use crate::config::{self, SiftConfig};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

fn or_unset<T: std::fmt::Debug>(value: &Option<T>) -> String {
    match value {
        Some(v) => format!("{:?}", v),
        None => "(unset)".dimmed().to_string(),
    }
}

/// Show the effective configuration and the values derived from the environment
pub async fn run_show(config_path: Option<&Path>) -> Result<()> {
    let config = config::load(config_path).context("Failed to load configuration")?;
    let source = match config_path {
        Some(p) => p.display().to_string(),
        None if Path::new(config::CONFIG_FILE_NAME).exists() => config::CONFIG_FILE_NAME.to_string(),
        None => "(defaults)".to_string(),
    };

    println!("{}", "Sift Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), source.dimmed());
    print_sections(&config);

    println!("\n{}", "Resolved:".bold());
    println!(
        "  {} = {}",
        "concurrency".cyan(),
        config
            .build
            .concurrency
            .unwrap_or_else(config::default_concurrency)
    );
    println!(
        "  {} = {}",
        "persistent cache".cyan(),
        config::persistence_enabled(&config.cache)
    );
    println!(
        "  {} = {}",
        "cache root".cyan(),
        config::cache_root(&config.cache).display()
    );

    Ok(())
}

fn print_sections(config: &SiftConfig) {
    let build = &config.build;
    println!("{}", "[build]".yellow());
    println!("  {} = {:?}", "input".cyan(), build.input);
    println!("  {} = {:?}", "output".cyan(), build.output);
    println!("  {} = {:?}", "mode".cyan(), build.mode);
    println!("  {} = {}", "concurrency".cyan(), or_unset(&build.concurrency));
    println!("  {} = {:?}", "link_mode".cyan(), build.link_mode);
    println!(
        "  {} = {}",
        "dependency_invalidation".cyan(),
        build.dependency_invalidation
    );

    println!("\n{}", "[cache]".yellow());
    println!("  {} = {}", "persistent".cyan(), config.cache.persistent);
    println!("  {} = {}", "root".cyan(), or_unset(&config.cache.root));

    println!("\n{}", "[filter]".yellow());
    println!("  {} = {:?}", "name".cyan(), config.filter.name);
    println!("  {} = {}", "extensions".cyan(), or_unset(&config.filter.extensions));
    println!(
        "  {} = {}",
        "target_extension".cyan(),
        or_unset(&config.filter.target_extension)
    );
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}
