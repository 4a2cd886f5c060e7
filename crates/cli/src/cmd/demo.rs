//! In-memory demonstration
//!
//! Creates the configured key in a `MemoryStore`, writes 1, 2, 3 and so on
//! to the configured DWORD value on a fixed interval, and lets a
//! `ValueListener` report every change the watcher sees.

use crate::config::KeywatchConfig;
use crate::listener::ValueListener;
use anyhow::{Context, Result};
use keywatch_core::{guard_key, KeyStore, MemoryStore, Value};
use owo_colors::OwoColorize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use watcher::ChangeWatcher;

const MIN_SETTLE: Duration = Duration::from_millis(200);

/// How a demo run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoOutcome {
    pub writes: u32,
    pub interrupted: bool,
}

pub async fn run(config: &KeywatchConfig, interval_ms: Option<u64>, ticks: Option<u32>) -> Result<()> {
    let mut config = config.clone();
    if let Some(interval_ms) = interval_ms {
        config.demo.interval_ms = interval_ms;
    }
    if let Some(ticks) = ticks {
        config.demo.ticks = ticks;
    }
    config.validate().context("Invalid demo settings")?;

    println!(
        "{} {}\\{} every {}ms",
        "Writing".bold(),
        config.target.watch_target(),
        config.target.value.cyan(),
        config.demo.interval_ms
    );
    if config.demo.ticks == 0 {
        println!("{}", "Press Ctrl-C to stop".dimmed());
    }

    let outcome = drive(&config, tokio::signal::ctrl_c()).await?;

    let how = if outcome.interrupted { "interrupted" } else { "finished" };
    println!("{} Demo {} after {} writes", "✓".green(), how, outcome.writes);
    Ok(())
}

/// Run the writer and the watcher until all writes are done or `shutdown`
/// resolves
pub async fn drive<F>(config: &KeywatchConfig, shutdown: F) -> Result<DemoOutcome>
where
    F: Future<Output = std::io::Result<()>>,
{
    let store = Arc::new(MemoryStore::new());
    let target = config.target.watch_target();

    let key = store
        .create_key(target.root(), target.path())
        .with_context(|| format!("Failed to create {}", target))?;
    let key = guard_key(&store, key);
    store
        .set_value(key.get(), &config.target.value, &Value::from(0u32))
        .context("Failed to write initial value")?;

    let listener = ValueListener::new(Arc::clone(&store), &config.target);
    let watcher = ChangeWatcher::try_new(Arc::clone(&store), target.clone(), listener)?;
    if !watcher.start() {
        anyhow::bail!("Failed to start watching {}", target);
    }
    info!(key = %target, "Demo watcher started");

    let writes = Arc::new(AtomicU32::new(0));
    let writer = {
        let store = Arc::clone(&store);
        let writes = Arc::clone(&writes);
        let value = config.target.value.clone();
        let interval = Duration::from_millis(config.demo.interval_ms);
        let ticks = config.demo.ticks;

        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            let mut n = 0u32;
            while ticks == 0 || n < ticks {
                ticker.tick().await;
                n = n.wrapping_add(1);
                store
                    .set_value(key.get(), &value, &Value::from(n))
                    .context("Failed to write demo value")?;
                writes.fetch_add(1, Ordering::SeqCst);
                debug!(value = n, "Demo value written");
            }

            // Time for the last change to be reported
            tokio::time::sleep(interval.max(MIN_SETTLE)).await;
            Ok::<(), anyhow::Error>(())
        }
    };

    let interrupted = tokio::select! {
        result = writer => {
            result?;
            false
        }
        _ = shutdown => {
            info!("Received Ctrl+C");
            true
        }
    };

    watcher.stop();
    Ok(DemoOutcome {
        writes: writes.load(Ordering::SeqCst),
        interrupted,
    })
}
