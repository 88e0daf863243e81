//! Root, config and health endpoint tests

mod helpers;

use axum::http::StatusCode;
use helpers::{build_app, test_app, FakeDetector, FakeSpeech, Script};

#[tokio::test]
async fn test_root_message() {
    let app = test_app().await;
    let (status, body) = app.get_json("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Sightline API is running");
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app().await;
    let (status, body) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "sightline-api");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_client_config_lists_both_urls() {
    let app = build_app(
        FakeDetector::new(Script::Fail("unused".to_string())),
        FakeSpeech::default(),
        |config| {
            config.public_url = "https://sightline.example.org".to_string();
            config.fallback_url = "http://192.168.1.20:8000".to_string();
        },
    )
    .await;

    let (status, body) = app.get_json("/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend_url"], "https://sightline.example.org");
    assert_eq!(body["backend_fallback"], "http://192.168.1.20:8000");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app().await;
    let (status, _) = app.get_json("/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allowed() {
    let app = test_app().await;
    let (status, _) = app
        .send(
            axum::http::Request::builder()
                .method("OPTIONS")
                .uri("/users/login")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert!(status.is_success());
}
