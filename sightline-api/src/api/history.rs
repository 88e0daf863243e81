//! History ledger endpoints

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use sightline_common::api::{artifact_url, ArtifactKind, HistoryItemResponse};
use sightline_common::db::HistoryEntry;
use std::path::PathBuf;

use super::files::stream_file;
use crate::db::{history, users};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn to_item(entry: &HistoryEntry) -> HistoryItemResponse {
    let url_if = |path: &Option<String>, kind| path.as_ref().map(|_| artifact_url(kind, entry.id));
    HistoryItemResponse {
        id: entry.id,
        timestamp: entry.timestamp,
        results: entry.results.clone(),
        media_type: entry.media_type.as_str().to_string(),
        language: entry.language.clone(),
        audio_url: url_if(&entry.audio_path, ArtifactKind::Audio),
        video_url: url_if(&entry.video_path, ArtifactKind::Video),
        image_url: url_if(&entry.image_path, ArtifactKind::Image),
    }
}

async fn load_entry(state: &AppState, id: i64) -> ApiResult<HistoryEntry> {
    history::get_entry(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("History entry not found: {}", id)))
}

/// GET /history/{user_id}, newest first
pub async fn list_history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Vec<HistoryItemResponse>>> {
    if users::get_user(&state.db, user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User not found: {}", user_id)));
    }
    let entries = history::list_for_user(&state.db, user_id).await?;
    Ok(Json(entries.iter().map(to_item).collect()))
}

/// GET /history/entry/{id}
pub async fn get_history_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<HistoryItemResponse>> {
    let entry = load_entry(&state, id).await?;
    Ok(Json(to_item(&entry)))
}

/// DELETE /history/{id}
///
/// Removes the row, then its files. A second delete is a 404.
pub async fn delete_history_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let entry = history::delete_entry(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("History entry not found: {}", id)))?;

    state.store.remove_entry_files(&entry).await;
    tracing::info!(history_id = id, user_id = entry.user_id, "History entry deleted");

    Ok(Json(json!({ "message": "History entry deleted", "id": id })))
}

async fn stream_artifact(state: &AppState, id: i64, kind: ArtifactKind) -> ApiResult<Response> {
    let entry = load_entry(state, id).await?;
    let path = match kind {
        ArtifactKind::Audio => entry.audio_path,
        ArtifactKind::Video => entry.video_path,
        ArtifactKind::Image => entry.image_path,
    }
    .map(PathBuf::from)
    .ok_or_else(|| {
        ApiError::NotFound(format!("History entry {} has no {} file", id, kind.as_str()))
    })?;

    let download_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    stream_file(&path, download_name.as_deref()).await
}

/// GET /history/audio/{id}
pub async fn stream_audio(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    stream_artifact(&state, id, ArtifactKind::Audio).await
}

/// GET /history/video/{id}
pub async fn stream_video(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    stream_artifact(&state, id, ArtifactKind::Video).await
}

/// GET /history/image/{id}
pub async fn stream_image(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    stream_artifact(&state, id, ArtifactKind::Image).await
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/history/entry/:id", get(get_history_entry))
        .route("/history/audio/:id", get(stream_audio))
        .route("/history/video/:id", get(stream_video))
        .route("/history/image/:id", get(stream_image))
        .route(
            "/history/:id",
            get(list_history).delete(delete_history_entry),
        )
}
