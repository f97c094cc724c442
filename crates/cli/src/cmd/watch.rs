//! Watch command
//!
//! Polls the source tree on a fixed interval. An unchanged tree costs one
//! scan and an empty diff per tick.

use super::build;
use crate::BuildArgs;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Shortest accepted polling interval
const MIN_INTERVAL_MS: u64 = 10;

pub async fn run(
    config_path: Option<&Path>,
    args: &BuildArgs,
    interval_ms: u64,
    max_cycles: Option<u64>,
) -> Result<()> {
    let config = build::resolve(config_path, args)?;
    let (mut engine, _lock) = build::open(&config)?;

    if !args.json {
        println!(
            "{} {} {} {}",
            "Watching".bold(),
            engine.source_dir().display(),
            "->".dimmed(),
            engine.dest_dir().display()
        );
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(MIN_INTERVAL_MS)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cycles = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }

        let started = Instant::now();
        match engine.build().await {
            Ok(report) if report.patches.is_empty() && !report.reset => debug!("source unchanged"),
            Ok(report) => build::print_report(&report, args.json, started.elapsed())?,
            // The engine resets on the next tick, so keep polling
            Err(e) => {
                warn!(error = %e, "build failed");
                eprintln!("{} {}", "✗".red(), e);
            }
        }

        cycles += 1;
        if max_cycles.is_some_and(|max| cycles >= max) {
            break;
        }
    }

    Ok(())
}
