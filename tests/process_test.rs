mod common;

use axum::http::StatusCode;
use common::{StubBackend, TestApp, UNREACHABLE_BACKEND, spawn_backend};
use serde_json::{Value, json};
use std::time::Duration;

const DETECTED: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null,"properties":{"area":42.0}}]}"#;

fn received_points(backend: &StubBackend) -> Vec<[f64; 2]> {
    let received = backend.received.lock().unwrap();
    let points = received.last().unwrap().points.as_ref().unwrap();
    serde_json::from_str(points).unwrap()
}

#[tokio::test]
async fn test_process_without_raster_is_bad_request() {
    let backend = spawn_backend(StatusCode::OK, DETECTED).await;
    let app = TestApp::new(&backend.url).await;

    let (status, body) = app
        .post_json("/process", json!({"points": [[52.52, 13.405]]}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No satellite image found");
    assert!(backend.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_process_swaps_points_and_stores_result() {
    let backend = spawn_backend(StatusCode::OK, DETECTED).await;
    let app = TestApp::new(&backend.url).await;
    let image_id = app.seed_raster().await;

    let (status, body) = app
        .post_json(
            "/process",
            json!({"points": [[52.52, 13.405], [52.5201, 13.4052]]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["result_url"], "/uploads/building_regularized.geojson");

    assert_eq!(
        received_points(&backend),
        vec![[13.405, 52.52], [13.4052, 52.5201]]
    );
    {
        let received = backend.received.lock().unwrap();
        let call = received.last().unwrap();
        assert_eq!(
            call.image_name.as_deref(),
            Some(format!("satellite_{}.tif", image_id).as_str())
        );
        assert_eq!(call.image_type.as_deref(), Some("image/tiff"));
        assert_eq!(call.image_len, common::TIFF_STUB.len());
    }

    // Result bytes are stored as returned
    let (status, _, bytes) = app.get("/uploads/building_regularized.geojson").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], DETECTED.as_bytes());
}

#[tokio::test]
async fn test_process_prefers_explicit_image_id() {
    let backend = spawn_backend(StatusCode::OK, DETECTED).await;
    let app = TestApp::new(&backend.url).await;

    let older = app.seed_raster().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _newer = app.seed_raster().await;

    let (status, _) = app
        .post_json(
            "/process",
            json!({"points": [[52.52, 13.405]], "image_id": older}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let received = backend.received.lock().unwrap();
    assert_eq!(
        received.last().unwrap().image_name.as_deref(),
        Some(format!("satellite_{}.tif", older).as_str())
    );
}

#[tokio::test]
async fn test_process_unknown_image_id_is_bad_request() {
    let backend = spawn_backend(StatusCode::OK, DETECTED).await;
    let app = TestApp::new(&backend.url).await;
    app.seed_raster().await;

    let (status, body) = app
        .post_json(
            "/process",
            json!({"points": [[52.52, 13.405]], "image_id": uuid::Uuid::new_v4()}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Image file not found"));
}

#[tokio::test]
async fn test_process_propagates_backend_failure() {
    let backend = spawn_backend(StatusCode::SERVICE_UNAVAILABLE, "model still loading").await;
    let app = TestApp::new(&backend.url).await;
    app.seed_raster().await;

    let (status, body) = app
        .post_json("/process", json!({"points": [[52.52, 13.405]]}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "Processing failed on inference server (Status 503): model still loading"
    );
    assert!(
        !app.stored_names()
            .contains(&"building_regularized.geojson".to_string())
    );
}

#[tokio::test]
async fn test_process_reports_unreachable_backend() {
    let app = TestApp::new(UNREACHABLE_BACKEND).await;
    app.seed_raster().await;

    let (status, body) = app
        .post_json("/process", json!({"points": [[52.52, 13.405]]}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to connect to inference server")
    );
}

#[tokio::test]
async fn test_process_rejects_malformed_points() {
    let app = TestApp::new(UNREACHABLE_BACKEND).await;

    let (status, body) = app
        .post_json("/process", json!({"points": [[52.52]]}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_process_rejects_oversized_body() {
    let app = TestApp::new(UNREACHABLE_BACKEND).await;
    app.seed_raster().await;

    let limit = app.state.config.max_content_length;
    let mut body = br#"{"points": ["#.to_vec();
    while body.len() <= limit {
        body.extend_from_slice(b"[52.52, 13.405], ");
    }
    body.extend_from_slice(b"[52.52, 13.405]]}");

    let (status, json) = app.post_bytes("/process", body).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().unwrap().contains("length limit exceeded"));
}

#[tokio::test]
async fn test_detection_job_lifecycle() {
    let backend = spawn_backend(StatusCode::OK, DETECTED).await;
    let app = TestApp::new(&backend.url).await;
    app.seed_raster().await;

    let (status, accepted) = app
        .post_json("/process/jobs", json!({"points": [[52.52, 13.405]]}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let status_url = accepted["status_url"].as_str().unwrap().to_string();
    assert_eq!(
        status_url,
        format!("/process/jobs/{}", accepted["job_id"].as_str().unwrap())
    );

    let mut last = Value::Null;
    for _ in 0..100 {
        let (status, body) = app.get_json(&status_url).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "pending" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(last["status"], "succeeded", "job: {}", last);
    assert_eq!(last["result_url"], "/uploads/building_regularized.geojson");
    assert_eq!(received_points(&backend), vec![[13.405, 52.52]]);
}

#[tokio::test]
async fn test_failed_job_reports_error() {
    let app = TestApp::new(UNREACHABLE_BACKEND).await;

    let (status, accepted) = app
        .post_json("/process/jobs", json!({"points": [[52.52, 13.405]]}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let status_url = accepted["status_url"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = app.get_json(&status_url).await;
        if body["status"] != "pending" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(last["status"], "failed");
    assert_eq!(last["error"], "No satellite image found");
}

#[tokio::test]
async fn test_job_status_lookup_errors() {
    let app = TestApp::new(UNREACHABLE_BACKEND).await;

    let (status, _) = app
        .get_json(&format!("/process/jobs/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get_json("/process/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid job id: not-a-uuid");
}
