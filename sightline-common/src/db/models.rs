//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

use crate::{Error, Result};

/// Registered user
///
/// `password` holds the salted digest produced by
/// [`crate::api::credentials::hash_password`], never the plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            language: row.try_get("language")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        })
    }
}

/// Kind of media a detection ran over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Image,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "video" => Ok(MediaType::Video),
            "image" => Ok(MediaType::Image),
            other => Err(Error::Internal(format!("Unknown media type: {}", other))),
        }
    }
}

/// Persisted record of one completed detection job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Narration lines / detected-object labels in announcement order
    pub results: Vec<String>,
    pub media_type: MediaType,
    pub video_path: Option<String>,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub language: String,
}

impl HistoryEntry {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let results: String = row.try_get("results")?;
        let results: Vec<String> = serde_json::from_str(&results)
            .map_err(|e| Error::Internal(format!("Failed to deserialize results: {}", e)))?;
        let media_type: String = row.try_get("media_type")?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp")?)?,
            results,
            media_type: MediaType::parse(&media_type)?,
            video_path: row.try_get("video_path")?,
            image_path: row.try_get("image_path")?,
            audio_path: row.try_get("audio_path")?,
            language: row.try_get("language")?,
        })
    }

    /// Every artifact path recorded for this entry
    pub fn artifact_paths(&self) -> impl Iterator<Item = &str> {
        [&self.video_path, &self.image_path, &self.audio_path]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }
}

/// Parse an RFC 3339 timestamp column
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}
