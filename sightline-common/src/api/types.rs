//! Shared API request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Users
// ========================================

/// POST /users/signup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// POST /users/login
///
/// `identifier` matches either the username or the email address.
/// Older clients send it as `username`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// PUT /users/{id}; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// User as returned by the API (no credentials)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

// ========================================
// Detection progress
// ========================================

/// Lifecycle of a detection job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Accepted, waiting for a pipeline slot
    Queued,
    /// Media stored on the server
    Uploaded,
    /// Detector or speech synthesis running
    Processing,
    Completed,
    Failed,
}

impl ProgressStatus {
    /// Completed and Failed are the only terminal states
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Queued => "queued",
            ProgressStatus::Uploaded => "uploaded",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }
}

/// POST /detect/start response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartDetectionResponse {
    pub task_id: Uuid,
    pub status: ProgressStatus,
}

/// GET /detect/progress/{task_id} response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgressResponse {
    pub task_id: Uuid,
    pub status: ProgressStatus,
    /// Percentage complete (0 - 100)
    pub progress: u8,
    pub message: String,
    /// History entry created by the job, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<i64>,
}

// ========================================
// Synchronous detection
// ========================================

/// POST /detect/{user_id}/with-audio and /detect/image/{user_id}/with-audio
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectWithAudioResponse {
    pub text_results: Vec<String>,
    pub audio_file: Option<String>,
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub detection_id: Option<i64>,
    pub media_type: String,
}

/// POST /detect/generate-audio response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerateAudioResponse {
    pub success: bool,
    pub audio_file: String,
    pub audio_url: String,
    pub message: String,
}

// ========================================
// History
// ========================================

/// One history entry as listed to clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoryItemResponse {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<String>,
    pub media_type: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Artifact kinds that can be streamed from a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Audio,
    Video,
    Image,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Video => "video",
            ArtifactKind::Image => "image",
        }
    }
}

/// Relative URL that streams `kind` for history entry `id`
pub fn artifact_url(kind: ArtifactKind, id: i64) -> String {
    format!("/history/{}/{}", kind.as_str(), id)
}

// ========================================
// Misc
// ========================================

/// GET /config response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigResponse {
    pub backend_url: String,
    pub backend_fallback: String,
}

/// Error body returned with every non-2xx status
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
