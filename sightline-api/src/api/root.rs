//! Liveness message and client bootstrap config

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use sightline_common::api::ConfigResponse;

use crate::AppState;

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Sightline API is running" }))
}

/// GET /config
///
/// Base URLs a browser client should try, primary first.
pub async fn client_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        backend_url: state.config.public_url.clone(),
        backend_fallback: state.config.fallback_url.clone(),
    })
}

pub fn root_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/config", get(client_config))
}
