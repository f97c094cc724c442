//! Sift CLI - sift command

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod config;
mod filters;
mod locks;
mod util;

/// Sift - incremental file processing
#[derive(Parser)]
#[command(name = "sift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: ./sift.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[build]` and `[filter]` sections
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Source directory
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Built-in filter name (upper, include)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Content operations in flight; implies async mode
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the persistent cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Print the build report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one build cycle
    Build(BuildArgs),
    /// Rebuild whenever the source tree changes
    Watch {
        #[command(flatten)]
        build: BuildArgs,

        /// Polling interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,

        /// Stop after this many polls
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Remove the persistent cache directory
    Clean,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print an annotated example sift.toml
    Example,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Build(args) => cmd::build::run(config_path, &args).await,
        Commands::Watch {
            build,
            interval_ms,
            max_cycles,
        } => cmd::watch::run(config_path, &build, interval_ms, max_cycles).await,
        Commands::Config(ConfigCommands::Show) => cmd::config::run_show(config_path).await,
        Commands::Config(ConfigCommands::Example) => cmd::config::run_example().await,
        Commands::Clean => cmd::clean::run(config_path).await,
    }
}
