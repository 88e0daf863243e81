//! History ledger endpoint tests

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use helpers::{test_app, TestApp, SAMPLE_MP4};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use tower::ServiceExt;

async fn detect(app: &TestApp, user_id: i64, file_name: &str) -> i64 {
    let (status, body) = app
        .upload(
            &format!("/detect/{}/with-audio", user_id),
            &[],
            Some((file_name, SAMPLE_MP4)),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "detection failed: {}", body);
    body["detection_id"].as_i64().unwrap()
}

fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_history_lists_newest_first_per_user() {
    let app = test_app().await;
    let amira = app.signup("amira").await;
    let basil = app.signup("basil").await;

    let first = detect(&app, amira, "one.mp4").await;
    let second = detect(&app, amira, "two.mp4").await;
    let other = detect(&app, basil, "three.mp4").await;

    let (status, list) = app.get_json(&format!("/history/{}", amira)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&list), vec![second, first]);

    let (_, list) = app.get_json(&format!("/history/{}", basil)).await;
    assert_eq!(ids(&list), vec![other]);
}

#[tokio::test]
async fn test_history_for_unknown_user() {
    let app = test_app().await;
    let (status, _) = app.get_json("/history/77").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_single_entry() {
    let app = test_app().await;
    let user_id = app.signup("amira").await;
    let id = detect(&app, user_id, "one.mp4").await;

    let (status, item) = app.get_json(&format!("/history/entry/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["id"].as_i64(), Some(id));
    assert_eq!(item["media_type"], "video");

    let (status, _) = app.get_json("/history/entry/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_artifacts_live_under_user_and_date() {
    let app = test_app().await;
    let user_id = app.signup("amira").await;
    let id = detect(&app, user_id, "one.mp4").await;

    let entry = sightline_api::db::history::get_entry(&app.state.db, id)
        .await
        .unwrap()
        .unwrap();
    let audio = PathBuf::from(entry.audio_path.unwrap());
    let video = PathBuf::from(entry.video_path.unwrap());

    let user_dir = app.config.history_dir().join("amira");
    assert!(audio.starts_with(&user_dir));
    assert_eq!(audio.parent(), video.parent());
    assert!(audio.file_name().unwrap().to_str().unwrap().starts_with("audio_"));
    assert!(video.file_name().unwrap().to_str().unwrap().starts_with("video_"));
    assert_eq!(video.extension().unwrap(), "mp4");
}

#[tokio::test]
async fn test_delete_removes_entry_and_files() {
    let app = test_app().await;
    let user_id = app.signup("amira").await;
    let keep = detect(&app, user_id, "keep.mp4").await;
    let gone = detect(&app, user_id, "gone.mp4").await;

    let entry = sightline_api::db::history::get_entry(&app.state.db, gone)
        .await
        .unwrap()
        .unwrap();
    let audio = PathBuf::from(entry.audio_path.clone().unwrap());
    assert!(audio.exists());

    let (status, body) = app.delete(&format!("/history/{}", gone)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64(), Some(gone));
    assert_eq!(body["message"], "History entry deleted");

    assert!(!audio.exists());
    assert!(!audio.parent().unwrap().exists());

    let (_, list) = app.get_json(&format!("/history/{}", user_id)).await;
    assert_eq!(ids(&list), vec![keep]);

    let (status, _) = app
        .send(
            Request::builder()
                .uri(format!("/history/audio/{}", gone))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleting twice is a 404, not a silent success
    let (status, _) = app.delete(&format!("/history/{}", gone)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The other entry still streams
    let (status, _) = app
        .send(
            Request::builder()
                .uri(format!("/history/audio/{}", keep))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stream_reports_missing_artifacts() {
    let app = test_app().await;
    let user_id = app.signup("amira").await;
    let id = detect(&app, user_id, "one.mp4").await;

    // Video entries have no image
    let (status, _) = app.get_json(&format!("/history/image/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A file removed behind the server's back is a 404 too
    let entry = sightline_api::db::history::get_entry(&app.state.db, id)
        .await
        .unwrap()
        .unwrap();
    std::fs::remove_file(entry.video_path.unwrap()).unwrap();
    let (status, body) = app.get_json(&format!("/history/video/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_audio_stream_headers() {
    let app = test_app().await;
    let user_id = app.signup("amira").await;
    let id = detect(&app, user_id, "one.mp4").await;

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder()
            .uri(format!("/history/audio/{}", id))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        helpers::FAKE_MP3.len().to_string().as_str()
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap();
    assert!(disposition.starts_with("inline; filename=\"audio_"));
}

fn get_gzip(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_large_json_is_gzipped_but_media_is_not() {
    let app = test_app().await;
    let amira = app.signup("amira").await;
    let mut last = 0;
    for name in ["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4", "f.mp4"] {
        last = detect(&app, amira, name).await;
    }

    let response = app
        .router
        .clone()
        .oneshot(get_gzip(&format!("/history/{}", amira)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    // gzip magic bytes
    assert_eq!(&body[..2], &[0x1f, 0x8b]);

    // Small JSON stays plain
    let response = app.router.clone().oneshot(get_gzip("/health")).await.unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

    let response = app
        .router
        .clone()
        .oneshot(get_gzip(&format!("/history/audio/{}", last)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    assert!(response.headers().get(header::CONTENT_LENGTH).is_some());
}
