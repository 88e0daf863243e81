//! In-memory progress records for detection jobs
//!
//! One record per task id. Percentages never go backwards and a record
//! that reached `completed` or `failed` is frozen. Terminal records are
//! pruned after the retention period whenever a new task is registered.

use chrono::{DateTime, Duration, Utc};
use sightline_common::api::{ProgressResponse, ProgressStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub task_id: Uuid,
    pub user_id: i64,
    pub status: ProgressStatus,
    /// Percentage complete (0 - 100)
    pub progress: u8,
    pub message: String,
    pub history_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    fn new(task_id: Uuid, user_id: i64) -> Self {
        Self {
            task_id,
            user_id,
            status: ProgressStatus::Queued,
            progress: 0,
            message: "Waiting to start".to_string(),
            history_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn to_response(&self) -> ProgressResponse {
        ProgressResponse {
            task_id: self.task_id,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            history_id: self.history_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    records: Arc<RwLock<HashMap<Uuid, ProgressRecord>>>,
    retention: Duration,
}

impl ProgressStore {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            retention: Duration::seconds(retention_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Register a new task in `queued` state
    pub async fn register(&self, user_id: i64) -> Uuid {
        let task_id = Uuid::new_v4();
        let mut records = self.records.write().await;
        prune_expired(&mut records, self.retention);
        records.insert(task_id, ProgressRecord::new(task_id, user_id));
        task_id
    }

    pub async fn get(&self, task_id: Uuid) -> Option<ProgressRecord> {
        self.records.read().await.get(&task_id).cloned()
    }

    /// Move a task forward
    ///
    /// A lower percentage than the current one is clamped up. Terminal
    /// records and unknown ids are left untouched. `Completed` always
    /// lands on 100.
    pub async fn update(
        &self,
        task_id: Uuid,
        status: ProgressStatus,
        progress: u8,
        message: impl Into<String>,
    ) {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&task_id) else {
            return;
        };
        if record.status.is_terminal() {
            debug!(task_id = %task_id, "Ignoring update for finished task");
            return;
        }

        let progress = if status == ProgressStatus::Completed {
            100
        } else {
            progress.min(100).max(record.progress)
        };

        record.status = status;
        record.progress = progress;
        record.message = message.into();
        record.updated_at = Utc::now();
    }

    pub async fn complete(&self, task_id: Uuid, history_id: i64) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&task_id) {
            if record.status.is_terminal() {
                return;
            }
            record.status = ProgressStatus::Completed;
            record.progress = 100;
            record.message = "Detection complete".to_string();
            record.history_id = Some(history_id);
            record.updated_at = Utc::now();
        }
    }

    /// Mark a task failed, keeping the percentage it reached
    pub async fn fail(&self, task_id: Uuid, message: impl Into<String>) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&task_id) {
            if record.status.is_terminal() {
                return;
            }
            record.status = ProgressStatus::Failed;
            record.message = message.into();
            record.updated_at = Utc::now();
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn prune_expired(records: &mut HashMap<Uuid, ProgressRecord>, retention: Duration) {
    let cutoff = Utc::now() - retention;
    let before = records.len();
    records.retain(|_, r| !(r.status.is_terminal() && r.updated_at < cutoff));
    let pruned = before - records.len();
    if pruned > 0 {
        debug!(pruned, "Pruned finished progress records");
    }
}
