//! Weekly mortality API server.
//!
//! Loads configuration, acquires the bootstrap snapshot, and serves the
//! HTTP API until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load and validate configuration
//! 3. Connect the snapshot archive, if a bucket is configured
//! 4. Build the live source
//! 5. Build the bootstrap source chain for the deploy mode
//! 6. Acquire the bootstrap snapshot
//! 7. Build shared application state
//! 8. Serve until Ctrl-C

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use mortality_api::{AppState, start_server};
use mortality_core::{
    LiveSource, LocalSource, SnapshotArchive, SnapshotSource, SnapshotStore, SourceChain,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, DeployEnv};
use crate::error::AppError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "mortality-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, no bootstrap snapshot can
/// be obtained, or the server cannot bind.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("mortality-server starting");

    // 2. Load configuration.
    let config = load_config()?;
    config.validate()?;
    let credentials = config.credentials().ok_or_else(|| {
        config::ConfigError::Invalid("admin credentials missing".to_owned())
    })?;
    info!(
        deploy_env = ?config.deploy.env,
        live_data_url = config.source.live_data_url,
        s3_bucket = ?config.archive.s3_bucket,
        use_s3_as_fallback = config.archive.use_s3_as_fallback,
        persist_live_snapshots = config.archive.persist_live_snapshots,
        commit = config.deploy.commit,
        "Configuration loaded"
    );

    // 3. Connect the archive.
    let archive = match config.archive.s3_bucket.as_deref() {
        Some(bucket) => {
            let archive = SnapshotArchive::s3(bucket, config.archive_timeout()).await;
            info!(bucket, "Snapshot archive configured");
            Some(archive)
        }
        None => {
            info!("No snapshot archive configured");
            None
        }
    };

    // 4. Build the live source.
    let mut live = LiveSource::new(config.source.live_data_url.clone(), config.fetch_timeout())?;
    if config.archive.persist_live_snapshots
        && let Some(archive) = &archive
    {
        live = live.with_persistence(archive.clone());
    }

    // 5. Build the bootstrap chain.
    let chain = bootstrap_chain(&config, &live, archive.as_ref());
    info!(sources = ?chain.names(), "Bootstrap sources resolved");

    // 6. Acquire the bootstrap snapshot.
    let snapshot = chain.fetch().await?;
    info!(
        captured_at = %snapshot.captured_at(),
        series = snapshot.len(),
        "Bootstrap snapshot loaded"
    );

    // 7. Build application state.
    let store = Arc::new(SnapshotStore::new(snapshot));
    let mut state =
        AppState::new(store, live, credentials).with_commit(config.deploy.commit.clone());
    if let Some(archive) = archive {
        state = state.with_archive(archive, config.archive.cleanup_keep_n_latest_snapshots);
    }

    // 8. Serve.
    start_server(&config.server_config(), Arc::new(state), shutdown_signal()).await?;

    info!("mortality-server stopped");
    Ok(())
}

/// Load configuration from `MORTALITY_CONFIG` or `mortality-config.yaml`,
/// falling back to defaults plus environment overrides.
fn load_config() -> Result<AppConfig, AppError> {
    let config_path = std::env::var("MORTALITY_CONFIG")
        .map_or_else(|_| PathBuf::from(CONFIG_FILE), PathBuf::from);

    if config_path.exists() {
        info!(path = %config_path.display(), "Loading config file");
        Ok(AppConfig::from_file(&config_path)?)
    } else {
        info!("Config file not found, using defaults");
        let mut config = AppConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }
}

/// Sources tried, in order, for the bootstrap snapshot.
fn bootstrap_chain(
    config: &AppConfig,
    live: &LiveSource,
    archive: Option<&SnapshotArchive>,
) -> SourceChain {
    let mut sources = Vec::new();
    match config.deploy.env {
        DeployEnv::Local => {
            if let Some(path) = &config.deploy.local_snapshot_path {
                sources.push(SnapshotSource::Local(LocalSource::new(path.clone())));
            }
        }
        DeployEnv::Production => {
            sources.push(SnapshotSource::Live(live.clone()));
            if config.archive.use_s3_as_fallback
                && let Some(archive) = archive
            {
                sources.push(SnapshotSource::Archive(archive.clone()));
            }
        }
    }
    SourceChain::new(sources)
}

/// Resolves on Ctrl-C. If the handler cannot be installed, the server runs
/// until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
