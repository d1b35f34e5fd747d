//! Headless entry point for Paper Trail
//!
//! Opens the credential vault, mirrors the persisted sync configuration into
//! the local database and keeps it replicated until interrupted.
//!
//! # Environment
//!
//! - `PAPER_TRAIL_DATA_DIR`: data directory (default: platform local data dir)
//! - `PAPER_TRAIL_SYNC_INTERVAL_MINUTES`: auto-sync interval (default: 5)
//! - `RUST_LOG`: log filter (default: `info`)

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use paper_trail_app::{AppPaths, AppStateBuilder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 5;
const MAX_SYNC_INTERVAL_MINUTES: u64 = 24 * 60;

#[tokio::main]
async fn main() -> ExitCode {
    // Library crates log through `log`; the subscriber picks those records up too
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let paths = match std::env::var_os("PAPER_TRAIL_DATA_DIR") {
        Some(dir) if !dir.is_empty() => AppPaths::new(PathBuf::from(dir)),
        _ => AppPaths::platform_default().context("Failed to resolve the data directory")?,
    };
    let interval = parse_interval(
        std::env::var("PAPER_TRAIL_SYNC_INTERVAL_MINUTES")
            .ok()
            .as_deref(),
    )?;

    tracing::info!(
        "Starting Paper Trail (data dir: {})",
        paths.data_dir().display()
    );

    let state = AppStateBuilder::for_platform(&paths)
        .context("Failed to open local stores")?
        .build()
        .context("Failed to build application state")?;
    state.run_startup().await.context("Startup failed")?;

    if !state.sync_service.get_config().is_ready() {
        tracing::warn!("Sync is disabled or not configured; scheduled syncs will be skipped");
    }

    let auto_sync = state.sync_service.start_auto_sync(interval);
    tracing::info!(
        "Auto-sync every {} minute(s), press Ctrl-C to stop",
        interval.as_secs() / 60
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    auto_sync.shutdown().await;
    Ok(())
}

/// Sync interval from the environment value, in whole minutes
fn parse_interval(raw: Option<&str>) -> anyhow::Result<Duration> {
    let minutes = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("Invalid PAPER_TRAIL_SYNC_INTERVAL_MINUTES: {value}"))?,
        None => DEFAULT_SYNC_INTERVAL_MINUTES,
    };
    if !(1..=MAX_SYNC_INTERVAL_MINUTES).contains(&minutes) {
        bail!(
            "PAPER_TRAIL_SYNC_INTERVAL_MINUTES must be between 1 and {MAX_SYNC_INTERVAL_MINUTES}"
        );
    }
    Ok(Duration::from_secs(minutes * 60))
}
