//! Test helper utilities
//!
//! Builds the full router over an in-memory database and a temporary
//! root folder, with scripted detector and speech fakes.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sightline_api::pipeline::classes::ModelSource;
use sightline_api::pipeline::detector::{BoundingBox, FrameDetections, RawDetection};
use sightline_api::pipeline::{
    DetectionReport, Detector, DetectorError, MediaKind, SpeechError, SpeechSynthesizer,
};
use sightline_api::AppState;
use sightline_common::config::ServerConfig;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::util::ServiceExt;

pub const FAKE_MP3: &[u8] = b"ID3\x03\x00\x00\x00\x00\x00\x00fake-mp3-frames";
pub const SAMPLE_MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isomfake-video";
pub const SAMPLE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

// ========================================
// Fakes
// ========================================

pub enum Script {
    Report(DetectionReport),
    Fail(String),
}

/// Detector that answers from a script
///
/// With a gate, each call waits for one permit before answering so
/// tests can hold a job mid-pipeline.
pub struct FakeDetector {
    script: Script,
    pub calls: AtomicUsize,
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeDetector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(script: Script, gate: Arc<Semaphore>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        }
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, media: &Path, _kind: MediaKind) -> Result<DetectionReport, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(media.exists(), "detector called with a missing upload");

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        match &self.script {
            Script::Report(report) => Ok(report.clone()),
            Script::Fail(msg) => Err(DetectorError::Status {
                status: 503,
                body: msg.clone(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    pub requests: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));
        if self.fail {
            return Err(SpeechError::Status { status: 429, chunk: 0 });
        }
        Ok(FAKE_MP3.to_vec())
    }
}

fn detection(source: ModelSource, class_id: u32, confidence: f32, cx: f32, y2: f32) -> RawDetection {
    RawDetection {
        source,
        class_id,
        confidence,
        bbox: BoundingBox {
            x1: cx - 40.0,
            y1: y2 - 120.0,
            x2: cx + 40.0,
            y2,
        },
        label: None,
    }
}

/// Street scene: a red light, then a car closing in from the left
pub fn street_report() -> DetectionReport {
    DetectionReport {
        width: 1280,
        height: 720,
        fps: 30.0,
        frames: vec![
            FrameDetections {
                index: Some(0),
                detections: vec![detection(ModelSource::TrafficLight, 3, 0.93, 640.0, 200.0)],
            },
            FrameDetections {
                index: Some(1),
                detections: vec![detection(ModelSource::General, 2, 0.88, 200.0, 680.0)],
            },
        ],
        ..Default::default()
    }
}

pub fn photo_report() -> DetectionReport {
    DetectionReport {
        width: 640,
        height: 480,
        frames: vec![FrameDetections {
            index: Some(0),
            detections: vec![
                detection(ModelSource::General, 0, 0.81, 320.0, 400.0),
                detection(ModelSource::Zebra, 8, 0.77, 320.0, 470.0),
            ],
        }],
        ..Default::default()
    }
}

// ========================================
// App
// ========================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub detector: Arc<FakeDetector>,
    pub speech: Arc<FakeSpeech>,
    pub config: ServerConfig,
    _root: TempDir,
}

pub async fn test_app() -> TestApp {
    build_app(FakeDetector::new(Script::Report(street_report())), FakeSpeech::default(), |_| {}).await
}

pub async fn build_app(
    detector: FakeDetector,
    speech: FakeSpeech,
    tweak: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let root = TempDir::new().expect("Failed to create temp dir");
    let mut config = ServerConfig::with_root(root.path());
    config.max_concurrent_jobs = 2;
    tweak(&mut config);
    config.ensure_directories().unwrap();

    let db = sightline_common::db::init_memory_database()
        .await
        .expect("Failed to create in-memory database");

    let detector = Arc::new(detector);
    let speech = Arc::new(speech);
    let state = AppState::new(db, config.clone(), detector.clone(), speech.clone());
    let router = sightline_api::build_router(state.clone());

    TestApp {
        router,
        state,
        detector,
        speech,
        config,
        _root: root,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        (status, parse(&body))
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    pub async fn upload(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body(fields, file);
        let (status, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    /// Register a user and return its id
    pub async fn signup(&self, username: &str) -> i64 {
        let (status, body) = self
            .send_json(
                "POST",
                "/users/signup",
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "correct horse",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        body["id"].as_i64().unwrap()
    }

    /// Poll a task until it is completed or failed, collecting every percentage seen
    pub async fn wait_for_task(&self, task_id: &str) -> (Value, Vec<u64>) {
        let mut seen = Vec::new();
        for _ in 0..500 {
            let (status, body) = self.get_json(&format!("/detect/progress/{}", task_id)).await;
            assert_eq!(status, StatusCode::OK);
            seen.push(body["progress"].as_u64().unwrap());
            let state = body["status"].as_str().unwrap().to_string();
            if state == "completed" || state == "failed" {
                return (body, seen);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", task_id);
    }

    pub fn uploads_left(&self) -> usize {
        std::fs::read_dir(self.config.uploads_dir()).unwrap().count()
    }
}

pub fn parse(body: &[u8]) -> Value {
    if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    }
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let boundary = "sightline-test-boundary";
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}
