//! sightline-api library interface
//!
//! Exposes the router and state so integration tests can drive the
//! service without binding a socket.

pub mod api;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod storage;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sightline_common::config::ServerConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::{DetectionPipeline, Detector, SpeechSynthesizer};
use crate::progress::ProgressStore;
use crate::storage::MediaStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ServerConfig>,
    pub store: MediaStore,
    pub progress: ProgressStore,
    pub pipeline: DetectionPipeline,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: ServerConfig,
        detector: Arc<dyn Detector>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let store = MediaStore::new(&config);
        let progress = ProgressStore::new(config.progress_retention_secs);
        let pipeline = DetectionPipeline::new(
            db.clone(),
            store.clone(),
            progress.clone(),
            detector,
            speech,
            config.max_concurrent_jobs,
        );

        Self {
            db,
            config: Arc::new(config),
            store,
            progress,
            pipeline,
            startup_time: Utc::now(),
        }
    }
}

/// Responses smaller than this are sent uncompressed
const COMPRESSION_MIN_BYTES: u16 = 1000;

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    // Media is already compressed and is streamed with a known length
    let compress_when = SizeAbove::new(COMPRESSION_MIN_BYTES)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::const_new("audio/"))
        .and(NotForContentType::const_new("video/"));

    Router::new()
        .merge(api::root_routes())
        .merge(api::health_routes())
        .merge(api::user_routes())
        .merge(api::detection_routes())
        .merge(api::history_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new().gzip(true).compress_when(compress_when))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
