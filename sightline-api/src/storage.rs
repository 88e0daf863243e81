//! Media store
//!
//! Filesystem layout under the root folder:
//!
//! ```text
//! uploads/<uuid><ext>                                  in-flight uploads
//! history/<username>/<YYYY-MM-DD>/<HH-MM-SS>/...       per-job artifacts
//! tmp/audio_<hex>.mp3                                  ad-hoc narrations
//! ```
//!
//! Artifacts inside a job directory are named after the job time:
//! `video_HH-MM-SS.mp4`, `image_HH-MM-SS.png`, `audio_HH-MM-SS.mp3`.

use chrono::{DateTime, Utc};
use sightline_common::config::ServerConfig;
use sightline_common::db::{HistoryEntry, MediaType};
use sightline_common::time::{date_folder, time_folder};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Image extensions accepted by the image endpoints
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Debug, Clone)]
pub struct MediaStore {
    uploads: PathBuf,
    history: PathBuf,
    tmp: PathBuf,
}

impl MediaStore {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            uploads: config.uploads_dir(),
            history: config.history_dir(),
            tmp: config.tmp_dir(),
        }
    }

    /// Fresh path for an incoming upload, keeping the client's extension
    pub fn upload_path(&self, extension: &str) -> PathBuf {
        self.uploads
            .join(format!("{}{}", Uuid::new_v4(), dotted(extension)))
    }

    /// Create the artifact directory for a job
    ///
    /// Two jobs for the same user in the same second get `HH-MM-SS`,
    /// `HH-MM-SS-1`, ... so neither overwrites the other.
    pub async fn create_entry_dir(
        &self,
        username: &str,
        timestamp: &DateTime<Utc>,
    ) -> io::Result<PathBuf> {
        let day_dir = self
            .history
            .join(safe_segment(username))
            .join(date_folder(timestamp));
        tokio::fs::create_dir_all(&day_dir).await?;

        let base = time_folder(timestamp);
        let mut candidate = day_dir.join(&base);
        let mut attempt = 0u32;
        loop {
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    candidate = day_dir.join(format!("{}-{}", base, attempt));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Copy the source media into the job directory
    pub async fn store_media(
        &self,
        entry_dir: &Path,
        source: &Path,
        media: MediaType,
        extension: &str,
        timestamp: &DateTime<Utc>,
    ) -> io::Result<PathBuf> {
        let name = artifact_name(media.as_str(), timestamp, extension);
        let target = entry_dir.join(name);
        tokio::fs::copy(source, &target).await?;
        Ok(target)
    }

    /// Write an annotated media payload produced by the detector
    pub async fn write_media(
        &self,
        entry_dir: &Path,
        bytes: &[u8],
        media: MediaType,
        extension: &str,
        timestamp: &DateTime<Utc>,
    ) -> io::Result<PathBuf> {
        let target = entry_dir.join(artifact_name(media.as_str(), timestamp, extension));
        tokio::fs::write(&target, bytes).await?;
        Ok(target)
    }

    pub async fn write_audio(
        &self,
        entry_dir: &Path,
        mp3: &[u8],
        timestamp: &DateTime<Utc>,
    ) -> io::Result<PathBuf> {
        let target = entry_dir.join(artifact_name("audio", timestamp, "mp3"));
        tokio::fs::write(&target, mp3).await?;
        Ok(target)
    }

    /// Write an ad-hoc narration into `tmp/`, returning its file name
    pub async fn write_tmp_audio(&self, mp3: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.tmp).await?;
        let simple = Uuid::new_v4().simple().to_string();
        let file_name = format!("audio_{}.mp3", &simple[..8]);
        tokio::fs::write(self.tmp.join(&file_name), mp3).await?;
        Ok(file_name)
    }

    /// Path of an ad-hoc narration, if the name is a plain file name
    pub fn tmp_audio_path(&self, file_name: &str) -> Option<PathBuf> {
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name.starts_with('.')
        {
            return None;
        }
        Some(self.tmp.join(file_name))
    }

    /// Best-effort removal of a finished upload
    pub async fn discard_upload(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to delete temporary upload");
            }
        }
    }

    /// Remove every artifact of an entry and its directory once empty
    ///
    /// Missing files are skipped. Only directories inside the history
    /// root are ever removed.
    pub async fn remove_entry_files(&self, entry: &HistoryEntry) {
        let mut dirs = Vec::new();
        for path in entry.artifact_paths().map(PathBuf::from) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact"),
            }
            if let Some(parent) = path.parent() {
                if parent.starts_with(&self.history) && !dirs.iter().any(|d| d == parent) {
                    dirs.push(parent.to_path_buf());
                }
            }
        }

        for dir in dirs {
            if dir == self.history {
                continue;
            }
            // remove_dir fails on non-empty directories, which is what we want
            if tokio::fs::remove_dir(&dir).await.is_ok() {
                debug!(dir = %dir.display(), "Removed empty entry directory");
            }
        }
    }
}

/// `<kind>_HH-MM-SS.<ext>`
fn artifact_name(kind: &str, timestamp: &DateTime<Utc>, extension: &str) -> String {
    format!("{}_{}{}", kind, time_folder(timestamp), dotted(extension))
}

fn dotted(extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        String::new()
    } else {
        format!(".{}", ext)
    }
}

/// Lowercased extension of an uploaded file name, without the dot
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported_image(extension: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
}

/// Content type derived from a file extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Directory-safe form of a username
fn safe_segment(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, MediaStore) {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::with_root(dir.path());
        config.ensure_directories().unwrap();
        let store = MediaStore::new(&config);
        (dir, store)
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 5).unwrap()
    }

    #[tokio::test]
    async fn test_entry_dir_layout() {
        let (_dir, store) = store();
        let entry_dir = store.create_entry_dir("alice", &ts()).await.unwrap();
        assert!(entry_dir.ends_with("alice/2024-05-01/14-30-05"));
        assert!(entry_dir.is_dir());
    }

    #[tokio::test]
    async fn test_same_second_jobs_get_distinct_dirs() {
        let (_dir, store) = store();
        let first = store.create_entry_dir("alice", &ts()).await.unwrap();
        let second = store.create_entry_dir("alice", &ts()).await.unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("14-30-05-1"));
    }

    #[tokio::test]
    async fn test_artifact_names_follow_job_time() {
        let (dir, store) = store();
        let entry_dir = store.create_entry_dir("alice", &ts()).await.unwrap();

        let source = dir.path().join("clip.mp4");
        tokio::fs::write(&source, b"video").await.unwrap();

        let video = store
            .store_media(&entry_dir, &source, MediaType::Video, "mp4", &ts())
            .await
            .unwrap();
        let audio = store.write_audio(&entry_dir, b"mp3", &ts()).await.unwrap();

        assert_eq!(video.file_name().unwrap(), "video_14-30-05.mp4");
        assert_eq!(audio.file_name().unwrap(), "audio_14-30-05.mp3");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_remove_entry_files_drops_empty_dir() {
        let (_dir, store) = store();
        let entry_dir = store.create_entry_dir("alice", &ts()).await.unwrap();
        let audio = store.write_audio(&entry_dir, b"mp3", &ts()).await.unwrap();

        let entry = HistoryEntry {
            id: 1,
            user_id: 1,
            timestamp: ts(),
            results: vec![],
            media_type: MediaType::Video,
            video_path: Some(entry_dir.join("missing.mp4").display().to_string()),
            image_path: None,
            audio_path: Some(audio.display().to_string()),
            language: "en".to_string(),
        };

        store.remove_entry_files(&entry).await;
        assert!(!audio.exists());
        assert!(!entry_dir.exists());
        // Day directory is left alone
        assert!(entry_dir.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_tmp_audio_names_are_plain_files() {
        let (_dir, store) = store();
        let name = store.write_tmp_audio(b"mp3").await.unwrap();
        assert!(name.starts_with("audio_") && name.ends_with(".mp3"));
        assert!(store.tmp_audio_path(&name).unwrap().exists());

        assert!(store.tmp_audio_path("../sightline.db").is_none());
        assert!(store.tmp_audio_path("a/b.mp3").is_none());
        assert!(store.tmp_audio_path("").is_none());
    }

    #[test]
    fn test_extension_helpers() {
        assert_eq!(extension_of("Street.MP4"), "mp4");
        assert_eq!(extension_of("noext"), "");
        assert!(is_supported_image("JPEG"));
        assert!(!is_supported_image("gif"));
        assert_eq!(content_type_for(Path::new("a/b.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a/b.weird")), "application/octet-stream");
    }

    #[test]
    fn test_safe_segment() {
        assert_eq!(safe_segment("alice"), "alice");
        assert_eq!(safe_segment("../etc"), ".._etc");
        assert_eq!(safe_segment(".."), "_");
        assert_eq!(safe_segment("a b/c"), "a_b_c");
    }
}
