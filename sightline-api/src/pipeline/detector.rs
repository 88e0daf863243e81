//! Object detector client
//!
//! Inference runs in a separate service. The media file is posted as
//! multipart field `file` with `?kind=video|image`; the reply is a JSON
//! [`DetectionReport`].

use async_trait::async_trait;
use base64::Engine;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::classes::ModelSource;

pub use sightline_common::db::MediaType as MediaKind;

/// Video inference can take minutes on CPU-only hosts
const DETECT_TIMEOUT: Duration = Duration::from_secs(600);

const USER_AGENT: &str = concat!("sightline-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Cannot read media file: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("Detector request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Detector returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid detection report: {0}")]
    InvalidReport(String),
}

/// Pixel-space box, top-left to bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub source: ModelSource,
    pub class_id: u32,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Class name from the model's own label table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    /// Frame number in the source video; absent when the detector does not number frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub fps: f32,
    #[serde(default)]
    pub frames: Vec<FrameDetections>,
    /// Base64 media with boxes drawn in, when the detector renders one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_media: Option<String>,
    /// Extension of `annotated_media` (without the dot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_extension: Option<String>,
}

impl DetectionReport {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::InvalidReport(format!(
                "frame size {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Decode the annotated media payload, if present
    pub fn annotated_bytes(&self) -> Result<Option<Vec<u8>>, DetectorError> {
        match &self.annotated_media {
            None => Ok(None),
            Some(encoded) if encoded.is_empty() => Ok(None),
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| DetectorError::InvalidReport(format!("annotated media: {}", e))),
        }
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, media: &Path, kind: MediaKind) -> Result<DetectionReport, DetectorError>;
}

/// Detector backed by an HTTP inference service
pub struct HttpDetector {
    client: Client,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, DetectorError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DETECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, media: &Path, kind: MediaKind) -> Result<DetectionReport, DetectorError> {
        let bytes = tokio::fs::read(media).await?;
        let file_name = media
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();

        debug!(
            endpoint = %self.endpoint,
            kind = kind.as_str(),
            bytes = bytes.len(),
            "Posting media to detector"
        );

        let form = multipart::Form::new().part("file", multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("kind", kind.as_str())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let report: DetectionReport = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidReport(e.to_string()))?;
        report.validate()?;

        debug!(
            frames = report.frames.len(),
            width = report.width,
            height = report.height,
            "Detector report received"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_parses_detector_json() {
        let json = r#"{
            "width": 1280,
            "height": 720,
            "fps": 30.0,
            "frames": [
                {"index": 0, "detections": [
                    {"source": "general", "class_id": 2, "confidence": 0.91,
                     "box": {"x1": 500.0, "y1": 300.0, "x2": 700.0, "y2": 650.0}}
                ]}
            ]
        }"#;

        let report: DetectionReport = serde_json::from_str(json).unwrap();
        assert!(report.validate().is_ok());
        assert_eq!(report.frames.len(), 1);
        let det = &report.frames[0].detections[0];
        assert_eq!(det.source, ModelSource::General);
        assert_eq!(det.bbox.center_x(), 600.0);
        assert!(report.annotated_bytes().unwrap().is_none());
        assert_eq!(report.frames[0].index, Some(0));
        assert_eq!(det.label, None);
    }

    #[test]
    fn test_report_keeps_labels_and_missing_indices() {
        let json = r#"{
            "width": 640,
            "height": 480,
            "frames": [
                {"detections": [
                    {"source": "general", "class_id": 11, "confidence": 0.9, "label": "stop sign",
                     "box": {"x1": 10.0, "y1": 10.0, "x2": 60.0, "y2": 60.0}}
                ]}
            ]
        }"#;

        let report: DetectionReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.frames[0].index, None);
        assert_eq!(report.frames[0].detections[0].label.as_deref(), Some("stop sign"));
    }

    #[test]
    fn test_zero_sized_frame_rejected() {
        let report = DetectionReport::default();
        assert!(matches!(
            report.validate(),
            Err(DetectorError::InvalidReport(_))
        ));
    }

    #[test]
    fn test_annotated_media_decodes() {
        let report = DetectionReport {
            width: 10,
            height: 10,
            annotated_media: Some("aGVsbG8=".to_string()),
            ..Default::default()
        };
        assert_eq!(report.annotated_bytes().unwrap(), Some(b"hello".to_vec()));

        let broken = DetectionReport {
            annotated_media: Some("***".to_string()),
            ..report
        };
        assert!(broken.annotated_bytes().is_err());
    }
}
