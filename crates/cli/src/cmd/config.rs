//! Configuration command
//!
//! Shows the effective configuration, its location, or an example file.

use crate::config::{self, KeywatchConfig};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

/// Print the configuration in effect
pub fn run_show(config: &KeywatchConfig, source: Option<&Path>) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;

    println!("{}", "Keywatch Configuration".bold());
    match source {
        Some(path) if path.exists() => {
            println!("{}: {}\n", "Location".dimmed(), path.display().dimmed());
        }
        Some(path) => {
            println!(
                "{}: {} {}\n",
                "Location".dimmed(),
                path.display().dimmed(),
                "(not found, using defaults)".yellow()
            );
        }
        None => println!("{}\n", "No config directory, using defaults".yellow()),
    }
    print!("{}", rendered);

    println!("\n{}", "Valid Ranges:".bold());
    println!("  demo.interval_ms: 10-60,000");
    println!("  demo.ticks: 0 = until Ctrl-C");
    Ok(())
}

/// Print the default config file location
pub fn run_path() -> Result<()> {
    let path = config::default_path().context("Could not determine config file path")?;
    println!("{}", path.display());
    if !path.exists() {
        println!("{}", "File does not exist. Use 'keywatch config --example' for a template.".yellow());
    }
    Ok(())
}

pub fn run_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}
