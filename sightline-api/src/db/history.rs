//! History ledger queries
//!
//! One row per completed detection job. Artifact files are owned by the
//! media store; this module only records their paths.

use chrono::{DateTime, Utc};
use sightline_common::db::{HistoryEntry, MediaType};
use sightline_common::{Error, Result};
use sqlx::SqlitePool;

const HISTORY_COLUMNS: &str =
    "id, user_id, timestamp, results, media_type, video_path, image_path, audio_path, language";

/// Fields for a new history row
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<String>,
    pub media_type: MediaType,
    pub video_path: Option<String>,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub language: String,
}

/// Insert a history row and return its id
pub async fn insert_entry(pool: &SqlitePool, entry: &NewHistoryEntry) -> Result<i64> {
    let results = serde_json::to_string(&entry.results)
        .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO detection_history (
            user_id, timestamp, results, media_type,
            video_path, image_path, audio_path, language
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.timestamp.to_rfc3339())
    .bind(&results)
    .bind(entry.media_type.as_str())
    .bind(&entry.video_path)
    .bind(&entry.image_path)
    .bind(&entry.audio_path)
    .bind(&entry.language)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Entries for a user, newest first
pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM detection_history WHERE user_id = ? ORDER BY timestamp DESC, id DESC",
        HISTORY_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(HistoryEntry::from_row).collect()
}

/// Load a single entry
pub async fn get_entry(pool: &SqlitePool, id: i64) -> Result<Option<HistoryEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM detection_history WHERE id = ?",
        HISTORY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(HistoryEntry::from_row).transpose()
}

/// Delete an entry, returning the removed row (None if already gone)
pub async fn delete_entry(pool: &SqlitePool, id: i64) -> Result<Option<HistoryEntry>> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        "SELECT {} FROM detection_history WHERE id = ?",
        HISTORY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let entry = match row {
        Some(row) => HistoryEntry::from_row(&row)?,
        None => return Ok(None),
    };

    sqlx::query("DELETE FROM detection_history WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{create_user, NewUser};
    use chrono::Duration;
    use sightline_common::db::init_memory_database;

    async fn seed_user(pool: &SqlitePool, name: &str) -> i64 {
        create_user(
            pool,
            &NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$ZGlnZXN0".to_string(),
                language: "en".to_string(),
            },
        )
        .await
        .unwrap()
        .id
    }

    fn entry_at(user_id: i64, timestamp: DateTime<Utc>, label: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            user_id,
            timestamp,
            results: vec![label.to_string()],
            media_type: MediaType::Video,
            video_path: Some(format!("/tmp/{}.mp4", label)),
            image_path: None,
            audio_path: Some(format!("/tmp/{}.mp3", label)),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_per_user() {
        let pool = init_memory_database().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        let now = Utc::now();

        insert_entry(&pool, &entry_at(alice, now - Duration::minutes(5), "older")).await.unwrap();
        insert_entry(&pool, &entry_at(alice, now, "newer")).await.unwrap();
        insert_entry(&pool, &entry_at(bob, now, "bobs")).await.unwrap();

        let entries = list_for_user(&pool, alice).await.unwrap();
        let labels: Vec<&str> = entries.iter().map(|e| e.results[0].as_str()).collect();
        assert_eq!(labels, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_get_round_trips_fields() {
        let pool = init_memory_database().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let id = insert_entry(&pool, &entry_at(alice, Utc::now(), "car")).await.unwrap();

        let entry = get_entry(&pool, id).await.unwrap().unwrap();
        assert_eq!(entry.user_id, alice);
        assert_eq!(entry.results, vec!["car".to_string()]);
        assert_eq!(entry.media_type, MediaType::Video);
        assert_eq!(entry.audio_path.as_deref(), Some("/tmp/car.mp3"));
        assert!(entry.image_path.is_none());
    }

    #[tokio::test]
    async fn test_delete_twice_returns_none_second_time() {
        let pool = init_memory_database().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let id = insert_entry(&pool, &entry_at(alice, Utc::now(), "car")).await.unwrap();

        assert!(delete_entry(&pool, id).await.unwrap().is_some());
        assert!(delete_entry(&pool, id).await.unwrap().is_none());
        assert!(get_entry(&pool, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_requires_existing_user() {
        let pool = init_memory_database().await.unwrap();
        let result = insert_entry(&pool, &entry_at(999, Utc::now(), "orphan")).await;
        assert!(result.is_err());
    }
}
