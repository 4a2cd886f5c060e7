//! Keywatch CLI - keywatch command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod cmd;
mod config;
mod listener;

/// Keywatch - get called back when a registry key changes
#[derive(Parser)]
#[command(name = "keywatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/keywatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level, overriding the config file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a key in an in-memory store while a writer changes it
    Demo {
        /// Milliseconds between writes (default: from config, 1000)
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Number of writes, 0 = until Ctrl-C (default: from config, 10)
        #[arg(long)]
        ticks: Option<u32>,
    },
    /// Watch the configured registry key until Ctrl-C
    #[cfg(windows)]
    Watch,
    /// Show configuration
    Config {
        /// Print an example config file
        #[arg(long)]
        example: bool,
        /// Print the default config file path
        #[arg(long, conflicts_with = "example")]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { example: true, .. } = cli.command {
        init_tracing(cli.verbose, Level::WARN);
        return cmd::config::run_example();
    }

    let config = config::load_or_default(cli.config.as_deref())?;
    init_tracing(cli.verbose, config.log.level()?);

    match cli.command {
        Commands::Demo { interval_ms, ticks } => cmd::demo::run(&config, interval_ms, ticks).await,
        #[cfg(windows)]
        Commands::Watch => cmd::watch::run(&config).await,
        Commands::Config { path: true, .. } => cmd::config::run_path(),
        Commands::Config { .. } => {
            let source = cli.config.clone().or_else(config::default_path);
            cmd::config::run_show(&config, source.as_deref())
        }
    }
}

fn init_tracing(verbose: bool, level: Level) {
    let level = if verbose { Level::DEBUG } else { level };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
