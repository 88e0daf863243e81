//! Upload and progress polling
//!
//! `Idle → Uploading → Polling → Completed | Failed`. Polling is client
//! driven; each poll feeds the tracker, which keeps the displayed
//! percentage monotonic and announces the 25/50/75/100 milestones once
//! per upload.

use sightline_common::api::{ProgressResponse, ProgressStatus};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::error::Result;
use crate::voice::Speaker;

pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading,
    Polling { task_id: Uuid },
    Completed { history_id: Option<i64> },
    Failed { message: String },
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed { .. } | UploadState::Failed { .. })
    }
}

/// Something the user should hear
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    Milestone(u8),
    Completed,
    Failed(String),
}

impl Announcement {
    pub fn text(&self) -> String {
        match self {
            Announcement::Milestone(pct) => format!("Processing {} percent", pct),
            Announcement::Completed => "Detection complete. Results are ready.".to_string(),
            Announcement::Failed(msg) => format!("Detection failed. {}", msg),
        }
    }
}

#[derive(Debug)]
pub struct UploadTracker {
    state: UploadState,
    /// Highest percentage seen; never goes down
    displayed: u8,
    announced: [bool; MILESTONES.len()],
    message: String,
}

impl Default for UploadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTracker {
    pub fn new() -> Self {
        Self {
            state: UploadState::Idle,
            displayed: 0,
            announced: [false; MILESTONES.len()],
            message: String::new(),
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn displayed(&self) -> u8 {
        self.displayed
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Begin a new upload; milestone flags start over
    pub fn start(&mut self) {
        self.state = UploadState::Uploading;
        self.displayed = 0;
        self.announced = [false; MILESTONES.len()];
        self.message = "Uploading".to_string();
    }

    /// Server accepted the upload
    pub fn accepted(&mut self, task_id: Uuid) {
        self.state = UploadState::Polling { task_id };
        self.message = "Waiting for the server".to_string();
    }

    /// Upload request itself failed
    pub fn upload_failed(&mut self, message: impl Into<String>) -> Announcement {
        let message = message.into();
        self.state = UploadState::Failed {
            message: message.clone(),
        };
        self.message = message.clone();
        Announcement::Failed(message)
    }

    /// Feed one poll result; returns what to announce, in order
    pub fn observe(&mut self, progress: &ProgressResponse) -> Vec<Announcement> {
        let mut out = Vec::new();
        if self.state.is_terminal() {
            return out;
        }

        self.displayed = self.displayed.max(progress.progress.min(100));
        self.message = progress.message.clone();

        if progress.status == ProgressStatus::Failed {
            self.state = UploadState::Failed {
                message: progress.message.clone(),
            };
            out.push(Announcement::Failed(progress.message.clone()));
            return out;
        }
        if progress.status == ProgressStatus::Completed {
            self.displayed = 100;
        }

        for (i, milestone) in MILESTONES.iter().enumerate() {
            if self.displayed >= *milestone && !self.announced[i] {
                self.announced[i] = true;
                out.push(Announcement::Milestone(*milestone));
            }
        }

        if progress.status == ProgressStatus::Completed {
            self.state = UploadState::Completed {
                history_id: progress.history_id,
            };
            out.push(Announcement::Completed);
        }
        out
    }
}

/// Upload `file`, then poll until the task ends, speaking announcements
///
/// Returns the final progress record. A `failed` task is a normal
/// return; only transport and HTTP errors are `Err`.
pub async fn upload_and_wait(
    client: &ApiClient,
    tracker: &mut UploadTracker,
    speaker: &dyn Speaker,
    file: &Path,
    language: Option<&str>,
    poll_interval: Duration,
) -> Result<ProgressResponse> {
    tracker.start();
    let started = match client.start_detection(file, language).await {
        Ok(started) => started,
        Err(e) => {
            speaker.speak(&tracker.upload_failed(e.to_string()).text());
            return Err(e);
        }
    };
    tracker.accepted(started.task_id);
    info!(task_id = %started.task_id, file = %file.display(), "Upload accepted");

    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        let progress = match client.progress(started.task_id).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(task_id = %started.task_id, error = %e, "Progress poll failed");
                speaker.speak(&tracker.upload_failed(e.to_string()).text());
                return Err(e);
            }
        };
        debug!(
            task_id = %started.task_id,
            status = progress.status.as_str(),
            progress = progress.progress,
            "Progress"
        );

        for announcement in tracker.observe(&progress) {
            speaker.speak(&announcement.text());
        }
        if tracker.state().is_terminal() {
            return Ok(progress);
        }
    }
}
