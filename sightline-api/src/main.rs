//! sightline-api - detection and narration backend
//!
//! Accepts street videos and photos, forwards them to the object
//! detector, narrates the result through a TTS service and keeps a
//! per-user history of every job.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sightline_common::config::{load_toml_config, ConfigOverrides, ServerConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sightline_api::pipeline::{HttpDetector, TranslateTts};
use sightline_api::AppState;

/// Command-line arguments for sightline-api
#[derive(Parser, Debug)]
#[command(name = "sightline-api")]
#[command(about = "Object detection and narration backend")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/sightline/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for the database and media storage
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Object detector inference endpoint
    #[arg(long)]
    detector_url: Option<String>,

    /// Text-to-speech endpoint
    #[arg(long)]
    tts_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root_folder: self.root_folder.clone(),
            host: self.host.clone(),
            port: self.port,
            detector_url: self.detector_url.clone(),
            tts_url: self.tts_url.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts so the level can come from it
    let toml = load_toml_config(args.config.as_deref())?;
    let config = ServerConfig::resolve(&args.overrides(), toml.as_ref())?;

    let default_directive = format!(
        "sightline_api={0},sightline_common={0},tower_http=info",
        config.logging.level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();

    info!(
        "Starting sightline-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", config.root_folder.display());

    config
        .ensure_directories()
        .context("Failed to initialize root folder")?;

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db = sightline_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    info!("Detector: {}", config.detector_url);
    info!("TTS: {}", config.tts_url);
    info!("Concurrent detection jobs: {}", config.max_concurrent_jobs);

    let detector = HttpDetector::new(config.detector_url.clone())
        .context("Failed to create detector client")?;
    let speech = TranslateTts::new(config.tts_url.clone())
        .context("Failed to create TTS client")?;

    let bind = (config.host.clone(), config.port);
    let state = AppState::new(db, config, Arc::new(detector), Arc::new(speech));
    let app = sightline_api::build_router(state);

    let listener = tokio::net::TcpListener::bind((bind.0.as_str(), bind.1))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", bind.0, bind.1))?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
