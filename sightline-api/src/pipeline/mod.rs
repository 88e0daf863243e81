//! Detection and narration pipeline
//!
//! One job takes an uploaded file through:
//!
//! | Status       | % | Stage |
//! |--------------|---|-------|
//! | `uploaded`   | 10 | upload stored |
//! | `processing` | 20 | detector called |
//! | `processing` | 60 | narration built |
//! | `processing` | 80 | audio synthesized |
//! | `processing` | 90 | artifacts stored |
//! | `completed`  | 100 | history entry written |
//!
//! Jobs run behind a semaphore; a job waiting for a slot reports `queued`.
//! The temporary upload is always removed when the job ends.

pub mod classes;
pub mod detector;
pub mod narration;
pub mod scene;
pub mod speech;

use chrono::{DateTime, Utc};
use sightline_common::api::ProgressStatus;
use sightline_common::db::{MediaType, User};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::history::{insert_entry, NewHistoryEntry};
use crate::progress::ProgressStore;
use crate::storage::MediaStore;

pub use detector::{DetectionReport, Detector, DetectorError, HttpDetector, MediaKind};
pub use speech::{SpeechError, SpeechSynthesizer, TranslateTts};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Uploaded file is unreadable: {0}")]
    Unreadable(String),

    #[error("Detection failed: {0}")]
    Detector(#[from] DetectorError),

    #[error("Speech synthesis failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Storing artifacts failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Recording history failed: {0}")]
    History(#[from] sightline_common::Error),

    #[error("Pipeline is shutting down")]
    Closed,
}

/// A stored upload waiting to be processed
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub user: User,
    /// Temporary file under `uploads/`
    pub upload: PathBuf,
    /// Client file extension, without the dot
    pub extension: String,
    pub media: MediaType,
    pub language: String,
}

/// Whether a speech failure fails the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPolicy {
    Required,
    /// Keep results and history without narration audio
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub history_id: i64,
    pub results: Vec<String>,
    pub media_path: PathBuf,
    pub audio_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    db: SqlitePool,
    store: MediaStore,
    progress: ProgressStore,
    detector: Arc<dyn Detector>,
    speech: Arc<dyn SpeechSynthesizer>,
    slots: Arc<Semaphore>,
}

impl DetectionPipeline {
    pub fn new(
        db: SqlitePool,
        store: MediaStore,
        progress: ProgressStore,
        detector: Arc<dyn Detector>,
        speech: Arc<dyn SpeechSynthesizer>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            db,
            store,
            progress,
            detector,
            speech,
            slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn speech(&self) -> &Arc<dyn SpeechSynthesizer> {
        &self.speech
    }

    /// Run a job tracked by `task_id`, recording the outcome in the progress store
    ///
    /// Failures end up as a `failed` record; nothing is returned.
    pub async fn run_task(&self, task_id: Uuid, job: MediaJob) {
        if self.slots.available_permits() == 0 {
            self.progress
                .update(task_id, ProgressStatus::Queued, 0, "Waiting for a free detection slot")
                .await;
        }

        let result = match self.slots.acquire().await {
            Ok(_permit) => self.process(&job, Some(task_id), AudioPolicy::Required).await,
            Err(_) => Err(PipelineError::Closed),
        };
        self.store.discard_upload(&job.upload).await;

        match result {
            Ok(outcome) => {
                info!(
                    task_id = %task_id,
                    user_id = job.user.id,
                    history_id = outcome.history_id,
                    results = outcome.results.len(),
                    "Detection task completed"
                );
                self.progress.complete(task_id, outcome.history_id).await;
            }
            Err(e) => {
                warn!(task_id = %task_id, user_id = job.user.id, error = %e, "Detection task failed");
                self.progress.fail(task_id, e.to_string()).await;
            }
        }
    }

    /// Run a job to completion for a synchronous endpoint
    pub async fn run_inline(
        &self,
        job: MediaJob,
        audio: AudioPolicy,
    ) -> Result<JobOutcome, PipelineError> {
        let result = match self.slots.acquire().await {
            Ok(_permit) => self.process(&job, None, audio).await,
            Err(_) => Err(PipelineError::Closed),
        };
        self.store.discard_upload(&job.upload).await;
        result
    }

    async fn report(&self, task_id: Option<Uuid>, status: ProgressStatus, progress: u8, message: &str) {
        if let Some(task_id) = task_id {
            self.progress.update(task_id, status, progress, message).await;
        }
    }

    async fn process(
        &self,
        job: &MediaJob,
        task_id: Option<Uuid>,
        audio: AudioPolicy,
    ) -> Result<JobOutcome, PipelineError> {
        self.report(task_id, ProgressStatus::Uploaded, 10, "Upload received").await;

        let metadata = tokio::fs::metadata(&job.upload)
            .await
            .map_err(|e| PipelineError::Unreadable(e.to_string()))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(PipelineError::Unreadable("file is empty".to_string()));
        }

        self.report(task_id, ProgressStatus::Processing, 20, "Detecting objects").await;
        let report = self.detector.detect(&job.upload, job.media).await?;

        let results = match job.media {
            MediaType::Video => scene::narrate_video(&report),
            MediaType::Image => scene::summarize_image(&report),
        };
        let text = narration::narration_text(&results);
        self.report(task_id, ProgressStatus::Processing, 60, "Narration ready").await;

        let mp3 = match self.speech.synthesize(&text, &job.language).await {
            Ok(mp3) => Some(mp3),
            Err(e) if audio == AudioPolicy::BestEffort => {
                warn!(user_id = job.user.id, error = %e, "Narration audio skipped");
                None
            }
            Err(e) => return Err(e.into()),
        };
        self.report(task_id, ProgressStatus::Processing, 80, "Audio ready").await;

        let timestamp = Utc::now();
        let entry_dir = self
            .store
            .create_entry_dir(&job.user.username, &timestamp)
            .await?;

        match self
            .store_and_record(job, &report, mp3.as_deref(), results, &entry_dir, &timestamp, task_id)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&entry_dir).await {
                    warn!(dir = %entry_dir.display(), error = %cleanup, "Failed to clean up entry directory");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_and_record(
        &self,
        job: &MediaJob,
        report: &DetectionReport,
        mp3: Option<&[u8]>,
        results: Vec<String>,
        entry_dir: &Path,
        timestamp: &DateTime<Utc>,
        task_id: Option<Uuid>,
    ) -> Result<JobOutcome, PipelineError> {
        let media_path = match report.annotated_bytes()? {
            Some(bytes) => {
                let extension = report
                    .annotated_extension
                    .as_deref()
                    .unwrap_or(job.extension.as_str());
                self.store
                    .write_media(entry_dir, &bytes, job.media, extension, timestamp)
                    .await?
            }
            None => {
                self.store
                    .store_media(entry_dir, &job.upload, job.media, &job.extension, timestamp)
                    .await?
            }
        };
        let audio_path = match mp3 {
            Some(mp3) => Some(self.store.write_audio(entry_dir, mp3, timestamp).await?),
            None => None,
        };
        self.report(task_id, ProgressStatus::Processing, 90, "Artifacts stored").await;

        let media_str = Some(media_path.display().to_string());
        let (video_path, image_path) = match job.media {
            MediaType::Video => (media_str, None),
            MediaType::Image => (None, media_str),
        };

        let history_id = insert_entry(
            &self.db,
            &NewHistoryEntry {
                user_id: job.user.id,
                timestamp: *timestamp,
                results: results.clone(),
                media_type: job.media,
                video_path,
                image_path,
                audio_path: audio_path.as_ref().map(|p| p.display().to_string()),
                language: job.language.clone(),
            },
        )
        .await?;

        Ok(JobOutcome {
            history_id,
            results,
            media_path,
            audio_path,
        })
    }
}
