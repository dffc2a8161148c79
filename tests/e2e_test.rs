//! End-to-end tests against a running deployment
//!
//! These tests require:
//! 1. PostgreSQL, Redis and MongoDB running (with migrations applied)
//! 2. API server running on the configured port
//! 3. Worker process running (with ffmpeg/ffprobe on PATH)
//! 4. A fixture video at the path given by E2E_VIDEO_PATH; for the detection
//!    assertions it should show a QR code reading "PROMO1" continuously from
//!    second 2 to second 6
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override the default (http://localhost:3000)

use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

fn base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn fixture_path() -> String {
    std::env::var("E2E_VIDEO_PATH").expect("E2E_VIDEO_PATH must point at a fixture video")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectionResponse {
    content: String,
    start_seconds: i64,
    duration_seconds: i32,
}

async fn upload_fixture(client: &reqwest::Client) -> UploadResponse {
    let bytes = tokio::fs::read(fixture_path())
        .await
        .expect("Failed to read fixture video");

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name("promo.mp4")
        .mime_str("video/mp4")
        .expect("Invalid mime type");
    let form = reqwest::multipart::Form::new().part("video", part);

    let response = client
        .post(format!("{}/v1/videos", base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Upload request failed");

    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let mut uploads: Vec<UploadResponse> =
        response.json().await.expect("Upload response should parse");
    assert_eq!(uploads.len(), 1);
    uploads.remove(0)
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_health_check() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_video_analysis_flow() {
    let client = reqwest::Client::new();

    let upload = upload_fixture(&client).await;
    println!("Uploaded analysis {}", upload.id);

    // Poll until the worker reaches a terminal status.
    let mut status = String::new();
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_secs(2)).await;

        let response = client
            .get(format!("{}/v1/videos/{}/status", base_url(), upload.id))
            .send()
            .await
            .expect("Status request failed");
        assert!(response.status().is_success());

        let body: StatusResponse = response.json().await.expect("Status response should parse");
        status = body.status;
        println!("Status: {}", status);

        if status == "Completed" || status == "Failed" {
            break;
        }
    }

    assert_eq!(status, "Completed", "analysis did not complete in time");

    // The fixture shows PROMO1 from second 2 to second 6.
    let response = client
        .get(format!("{}/v1/videos/{}/detections", base_url(), upload.id))
        .send()
        .await
        .expect("Detections request failed");
    assert!(response.status().is_success());

    let detections: Vec<DetectionResponse> = response
        .json()
        .await
        .expect("Detections response should parse");
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].content, "PROMO1");
    assert_eq!(detections[0].start_seconds, 2);
    assert_eq!(detections[0].duration_seconds, 4);

    // The mirrored document carries the same detections inline.
    let response = client
        .get(format!("{}/v1/videos/{}/document", base_url(), upload.id))
        .send()
        .await
        .expect("Document request failed");
    assert!(response.status().is_success());

    let document: serde_json::Value = response.json().await.expect("Document should parse");
    assert_eq!(document["status"], "Completed");
    assert_eq!(document["qrDetections"].as_array().map(|a| a.len()), Some(1));
}

#[tokio::test]
#[ignore] // Requires running API server
async fn test_e2e_rejects_disallowed_extension() {
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(b"not a video".to_vec())
        .file_name("malware.exe")
        .mime_str("application/octet-stream")
        .expect("Invalid mime type");
    let form = reqwest::multipart::Form::new().part("video", part);

    let response = client
        .post(format!("{}/v1/videos", base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Upload request failed");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
