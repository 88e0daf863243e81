//! Detection endpoints
//!
//! `POST /detect/start` stores the upload, answers with a task id and
//! runs the pipeline in the background; clients poll
//! `GET /detect/progress/{task_id}`. The older endpoints run the same
//! pipeline inline and answer when it is done.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sightline_common::api::{
    artifact_url, ArtifactKind, DetectWithAudioResponse, GenerateAudioResponse, ProgressResponse,
    ProgressStatus, StartDetectionResponse,
};
use sightline_common::db::{MediaType, User};
use uuid::Uuid;

use super::files::{receive_upload, stream_file, Accept, UploadForm};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::pipeline::{narration, AudioPolicy, JobOutcome, MediaJob, PipelineError};
use crate::storage::is_supported_image;
use crate::AppState;

async fn load_user(state: &AppState, user_id: i64) -> ApiResult<User> {
    users::get_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User not found: {}", user_id)))
}

fn job_for(user: User, form: UploadForm, media: MediaType) -> MediaJob {
    let language = form
        .field("language")
        .map(str::to_string)
        .unwrap_or_else(|| user.language.clone());
    MediaJob {
        user,
        upload: form.file.path,
        extension: form.file.extension,
        media,
        language,
    }
}

fn pipeline_error(err: PipelineError) -> ApiError {
    match err {
        PipelineError::Unreadable(msg) => ApiError::BadRequest(msg),
        other => ApiError::Internal(other.to_string()),
    }
}

/// Media type for `/detect/start`: explicit `media_type` field, else by extension
fn media_type_of(form: &UploadForm) -> ApiResult<MediaType> {
    match form.field("media_type") {
        Some("video") => Ok(MediaType::Video),
        Some("image") if is_supported_image(&form.file.extension) => Ok(MediaType::Image),
        Some("image") => Err(ApiError::BadRequest(
            "Invalid image format. Supported: jpg, jpeg, png, bmp, webp".to_string(),
        )),
        Some(other) => Err(ApiError::BadRequest(format!("Unknown media_type: {}", other))),
        None if is_supported_image(&form.file.extension) => Ok(MediaType::Image),
        None => Ok(MediaType::Video),
    }
}

/// POST /detect/start
///
/// Multipart fields: `user_id`, `file`, optional `language` and `media_type`.
pub async fn start_detection(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<StartDetectionResponse>)> {
    let form = receive_upload(
        &state.store,
        multipart,
        state.config.max_upload_bytes,
        Accept::AnyMedia,
    )
    .await?;

    let prepared = async {
        let user_id: i64 = form
            .field("user_id")
            .ok_or_else(|| ApiError::BadRequest("Missing 'user_id' field".to_string()))?
            .parse()
            .map_err(|_| ApiError::BadRequest("user_id must be an integer".to_string()))?;
        let user = load_user(&state, user_id).await?;
        let media = media_type_of(&form)?;
        Ok::<_, ApiError>((user, media))
    }
    .await;

    let (user, media) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            state.store.discard_upload(&form.file.path).await;
            return Err(e);
        }
    };

    let task_id = state.progress.register(user.id).await;
    tracing::info!(
        task_id = %task_id,
        user_id = user.id,
        media = media.as_str(),
        file_name = %form.file.file_name,
        size = form.file.size,
        "Detection task accepted"
    );

    let job = job_for(user, form, media);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.run_task(task_id, job).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartDetectionResponse {
            task_id,
            status: ProgressStatus::Queued,
        }),
    ))
}

/// GET /detect/progress/{task_id}
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<ProgressResponse>> {
    let record = state
        .progress
        .get(task_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: {}", task_id)))?;
    Ok(Json(record.to_response()))
}

async fn run_sync(
    state: &AppState,
    user_id: i64,
    multipart: Multipart,
    media: MediaType,
    audio: AudioPolicy,
) -> ApiResult<JobOutcome> {
    let user = load_user(state, user_id).await?;
    let accept = match media {
        MediaType::Video => Accept::AnyMedia,
        MediaType::Image => Accept::ImagesOnly,
    };
    let form = receive_upload(&state.store, multipart, state.config.max_upload_bytes, accept).await?;

    tracing::info!(user_id, media = media.as_str(), file_name = %form.file.file_name, "Synchronous detection");
    state
        .pipeline
        .run_inline(job_for(user, form, media), audio)
        .await
        .map_err(pipeline_error)
}

fn with_audio_response(outcome: JobOutcome, media: MediaType) -> DetectWithAudioResponse {
    let id = outcome.history_id;
    let (video_url, image_url) = match media {
        MediaType::Video => (Some(artifact_url(ArtifactKind::Video, id)), None),
        MediaType::Image => (None, Some(artifact_url(ArtifactKind::Image, id))),
    };
    DetectWithAudioResponse {
        text_results: outcome.results,
        audio_file: outcome
            .audio_path
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned()),
        audio_url: outcome
            .audio_path
            .as_ref()
            .map(|_| artifact_url(ArtifactKind::Audio, id)),
        video_url,
        image_url,
        detection_id: Some(id),
        media_type: media.as_str().to_string(),
    }
}

/// POST /detect/{user_id}
///
/// Narration audio is best-effort here; the results come back without it.
pub async fn detect_video(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<Vec<String>>> {
    let outcome =
        run_sync(&state, user_id, multipart, MediaType::Video, AudioPolicy::BestEffort).await?;
    Ok(Json(outcome.results))
}

/// POST /detect/{user_id}/with-audio
pub async fn detect_video_with_audio(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<DetectWithAudioResponse>> {
    let outcome = run_sync(&state, user_id, multipart, MediaType::Video, AudioPolicy::Required).await?;
    Ok(Json(with_audio_response(outcome, MediaType::Video)))
}

/// POST /detect/image/{user_id}
pub async fn detect_image(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<Vec<String>>> {
    let outcome =
        run_sync(&state, user_id, multipart, MediaType::Image, AudioPolicy::BestEffort).await?;
    Ok(Json(outcome.results))
}

/// POST /detect/image/{user_id}/with-audio
pub async fn detect_image_with_audio(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<DetectWithAudioResponse>> {
    let outcome = run_sync(&state, user_id, multipart, MediaType::Image, AudioPolicy::Required).await?;
    Ok(Json(with_audio_response(outcome, MediaType::Image)))
}

#[derive(Debug, Deserialize)]
pub struct GenerateAudioQuery {
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

/// POST /detect/generate-audio
///
/// Narrates an arbitrary list of lines into `tmp/`.
pub async fn generate_audio(
    State(state): State<AppState>,
    Query(query): Query<GenerateAudioQuery>,
    Json(lines): Json<Vec<String>>,
) -> ApiResult<Json<GenerateAudioResponse>> {
    let text = narration::narration_text(&lines);
    let mp3 = state
        .pipeline
        .speech()
        .synthesize(&text, &query.language)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to generate audio: {}", e)))?;
    let audio_file = state.store.write_tmp_audio(&mp3).await?;

    tracing::info!(audio_file = %audio_file, lines = lines.len(), "Ad-hoc narration generated");
    Ok(Json(GenerateAudioResponse {
        success: true,
        audio_url: format!("/detect/audio/{}", audio_file),
        audio_file,
        message: "Audio generated successfully".to_string(),
    }))
}

/// GET /detect/audio/{file}
pub async fn get_generated_audio(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<Response> {
    let path = state
        .store
        .tmp_audio_path(&file_name)
        .ok_or_else(|| ApiError::NotFound("Audio file not found".to_string()))?;
    stream_file(&path, Some(&file_name)).await
}

pub fn detection_routes() -> Router<AppState> {
    Router::new()
        .route("/detect/start", post(start_detection))
        .route("/detect/progress/:task_id", get(get_progress))
        .route("/detect/generate-audio", post(generate_audio))
        .route("/detect/audio/:file", get(get_generated_audio))
        .route("/detect/image/:user_id", post(detect_image))
        .route("/detect/image/:user_id/with-audio", post(detect_image_with_audio))
        .route("/detect/:user_id", post(detect_video))
        .route("/detect/:user_id/with-audio", post(detect_video_with_audio))
}
