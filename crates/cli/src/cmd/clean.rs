//! Clean command: removes the persistent cache

use crate::config;
use crate::util::{dir_size, format_size};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = config::load(config_path).context("Failed to load configuration")?;
    let root = config::cache_root(&config.cache);

    if !root.exists() {
        println!("{} {}", "✓".green(), "Nothing to clean".dimmed());
        return Ok(());
    }
    // Only ever delete something laid out like a blob store
    if !root.join("objects").is_dir() {
        anyhow::bail!(
            "Refusing to remove {}: not a sift cache directory",
            root.display()
        );
    }

    let size = dir_size(&root);
    std::fs::remove_dir_all(&root)
        .with_context(|| format!("Failed to remove {}", root.display()))?;

    println!(
        "{} Removed {} {}",
        "✓".green(),
        root.display(),
        format!("({})", format_size(size)).dimmed()
    );
    Ok(())
}
