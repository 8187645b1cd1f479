//! Drives the upload router end to end against a temporary assets directory.

use api_lib::config::Config;
use api_lib::web::{app, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use tracing::Level;

const BOUNDARY: &str = "studytrackerboundary";
const MB: usize = 1024 * 1024;

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: Vec<u8>,
    },
}

fn multipart_body(parts: Vec<Part<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn png(size: usize) -> Part<'static> {
    Part::File {
        name: "image",
        filename: "avatar.PNG",
        content_type: "image/png",
        data: vec![0x89; size],
    }
}

fn upload_request(parts: Vec<Part<'_>>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload-profile-image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

struct TestApp {
    router: Router,
    assets: TempDir,
}

impl TestApp {
    async fn with_limit(max_upload_bytes: usize) -> Self {
        let assets = TempDir::new().unwrap();
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            log_level: Level::INFO,
            assets_dir: assets.path().to_path_buf(),
            upload_subdir: "teachers".to_string(),
            max_upload_bytes,
        };
        let state = Arc::new(AppState::new(config).unwrap());
        state.images.ensure_dir().await.unwrap();
        Self {
            router: app(state),
            assets,
        }
    }

    async fn new() -> Self {
        Self::with_limit(5 * MB).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn stored_files(&self) -> Vec<String> {
        std::fs::read_dir(self.assets.path().join("teachers"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}

fn stamp_of(filename: &str) -> i64 {
    filename
        .rsplit('_')
        .next()
        .and_then(|rest| rest.split('.').next())
        .and_then(|digits| digits.parse().ok())
        .unwrap()
}

#[tokio::test]
async fn accepts_two_megabyte_png() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(upload_request(vec![Part::Text("userId", "u123"), png(2 * MB)]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("u123_"));
    assert!(filename.ends_with(".png"));
    assert_eq!(
        body["imageUrl"].as_str().unwrap(),
        format!("/assets/teachers/{filename}")
    );

    let written = std::fs::metadata(app.assets.path().join("teachers").join(filename)).unwrap();
    assert_eq!(written.len(), (2 * MB) as u64);
}

#[tokio::test]
async fn user_id_may_follow_the_file() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(upload_request(vec![png(1024), Part::Text("userId", "late-user")]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["filename"].as_str().unwrap().starts_with("late-user_"));
}

#[tokio::test]
async fn rejects_six_megabyte_image() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(upload_request(vec![Part::Text("userId", "u123"), png(6 * MB)]))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn configured_limit_applies_per_file() {
    let app = TestApp::with_limit(1024).await;
    let (status, body) = app.send(upload_request(vec![png(2048)])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "File too large");
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn missing_file_is_a_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(upload_request(vec![Part::Text("userId", "u123")]))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn non_image_is_rejected() {
    let app = TestApp::new().await;
    let pdf = Part::File {
        name: "image",
        filename: "notes.pdf",
        content_type: "application/pdf",
        data: b"%PDF-1.7".to_vec(),
    };
    let (status, body) = app.send(upload_request(vec![pdf])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Only image files are allowed!");

    let disguised = Part::File {
        name: "image",
        filename: "script.png",
        content_type: "text/javascript",
        data: b"alert(1)".to_vec(),
    };
    let (status, _) = app.send(upload_request(vec![disguised])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn timestamps_increase_across_uploads() {
    let app = TestApp::new().await;
    let mut previous = 0;
    for _ in 0..3 {
        let (status, body) = app
            .send(upload_request(vec![Part::Text("userId", "u123"), png(16)]))
            .await;
        assert_eq!(status, StatusCode::OK);
        let stamp = stamp_of(body["filename"].as_str().unwrap());
        assert!(stamp > previous);
        previous = stamp;
    }
    assert_eq!(app.stored_files().len(), 3);
}

#[tokio::test]
async fn anonymous_upload_is_served_back() {
    let app = TestApp::new().await;
    let (_, body) = app.send(upload_request(vec![png(32)])).await;
    let url = body["imageUrl"].as_str().unwrap().to_string();
    assert!(body["filename"].as_str().unwrap().starts_with("user_"));

    let request = Request::builder().uri(&url).body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.len(), 32);
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let app = TestApp::new().await;
    let mut request = upload_request(vec![png(8)]);
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:5173".parse().unwrap());
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
