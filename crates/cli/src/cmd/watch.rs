//! Watch a real registry key until Ctrl-C

use crate::config::KeywatchConfig;
use crate::listener::ValueListener;
use anyhow::{Context, Result};
use keywatch_core::WindowsStore;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tracing::info;
use watcher::ChangeWatcher;

pub async fn run(config: &KeywatchConfig) -> Result<()> {
    let store = Arc::new(WindowsStore::new());
    let target = config.target.watch_target();

    let listener = ValueListener::new(Arc::clone(&store), &config.target);
    println!(
        "{} {}\\{} (current value {})",
        "Watching".bold(),
        target,
        config.target.value.cyan(),
        listener.last()
    );

    let watcher = ChangeWatcher::try_new(store, target.clone(), listener)
        .with_context(|| format!("Failed to open {}", target))?;
    if !watcher.start() {
        anyhow::bail!("Failed to start watching {}", target);
    }
    println!("{}", "Press Ctrl-C to stop".dimmed());

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl+C");

    watcher.stop();
    println!("{} Stopped watching {}", "✓".green(), target);
    Ok(())
}
