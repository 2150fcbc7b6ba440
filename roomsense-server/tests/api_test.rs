use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use roomsense_server::store::StoreConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::common::mock_app::MockApp;

mod common;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_initial_snapshot() {
    let app = MockApp::new();

    let response = app.router.oneshot(get("/api/snapshot")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = json_body(response).await;
    assert_eq!(snapshot["temperature"], Value::Null);
    assert_eq!(snapshot["humidity"], Value::Null);
    assert_eq!(snapshot["light_status"], json!("unknown"));
    assert_eq!(snapshot["last_update"], Value::Null);
}

#[tokio::test]
async fn test_snapshot_after_partial_update() {
    let app = MockApp::new();
    app.receive("home/living_room/sensor", r#"{"humidity":55.0,"light_status":"off"}"#);
    app.receive("home/living_room/sensor", r#"{"temperature": "24.5"}"#);

    let response = app.router.oneshot(get("/api/snapshot")).await.unwrap();
    let snapshot = json_body(response).await;

    assert_eq!(snapshot["temperature"], json!(24.5));
    assert_eq!(snapshot["humidity"], json!(55.0));
    assert_eq!(snapshot["light_status"], json!("off"));
    assert!(snapshot["last_update"].is_string());
}

#[tokio::test]
async fn test_history_in_arrival_order() {
    let app = MockApp::new();
    app.receive("home/living_room/light", "on");
    app.receive("home/living_room/temperature", "21.0");
    app.receive("home/living_room/temperature", "21.5");

    let response = app.router.oneshot(get("/api/history")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let history = json_body(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["temperature"], json!(21.0));
    assert_eq!(history[1]["temperature"], json!(21.5));
    assert_eq!(history[1]["light_status"], json!("on"));
}

#[tokio::test]
async fn test_flush_and_read_back_records() {
    let app = MockApp::new();
    app.receive("home/living_room/sensor", r#"{"temperature":24.5,"humidity":55.0,"light_status":"unknown"}"#);
    app.receive("home/living_room/humidity", "56");

    let response = app.router.clone().oneshot(post("/api/flush")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let flushed = json_body(response).await;
    let path = flushed["path"].as_str().unwrap();
    assert!(std::path::Path::new(path).exists());
    assert!(path.starts_with(app.data_dir.to_str().unwrap()));

    let response = app.router.oneshot(get("/api/records")).await.unwrap();
    let records = json_body(response).await;
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["temperature"], json!(24.5));
    assert_eq!(records[1]["humidity"], json!(56.0));
}

#[tokio::test]
async fn test_flush_empty_buffer() {
    let app = MockApp::new();

    let response = app.router.oneshot(post("/api/flush")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(json_body(response).await, json!({ "path": null }));
}

#[tokio::test]
async fn test_flush_failure_keeps_buffer() {
    let app = MockApp::new();
    app.receive("home/living_room/temperature", "20.0");
    std::fs::remove_dir_all(&app.data_dir).unwrap();

    let response = app.router.oneshot(post("/api/flush")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let error = json_body(response).await;
    assert_eq!(error["error"]["code"], json!(500));
    assert!(error["error"]["message"].is_string());
    assert_eq!(app.subscriber.store().buffered_len(), 1);
}

#[tokio::test]
async fn test_automatic_flush_after_ten_messages() {
    let app = MockApp::with_config(StoreConfig {
        flush_every: 10,
        ..StoreConfig::default()
    });

    for i in 0..10 {
        app.receive("home/living_room/sensor", &format!(r#"{{"temperature":{}.5}}"#, 20 + i));
    }

    assert_eq!(app.subscriber.store().buffered_len(), 0);

    let response = app.router.oneshot(get("/api/records")).await.unwrap();
    let records = json_body(response).await;
    assert_eq!(records.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_connection_starts_disconnected() {
    let app = MockApp::new();

    let response = app.router.oneshot(get("/api/connection")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let state = json_body(response).await;
    assert_eq!(state["status"], json!("disconnected"));
    assert_eq!(state["retry_count"], json!(0));
    assert_eq!(state["last_error"], Value::Null);
}

#[tokio::test]
async fn test_connect_without_broker_times_out() {
    let app = MockApp::new();

    let response = app.router.clone().oneshot(post("/api/connect")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let response = app.router.oneshot(post("/api/disconnect")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let state = json_body(response).await;
    assert_eq!(state["status"], json!("disconnected"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let app = MockApp::new();

    for _ in 0..2 {
        let response = app.router.clone().oneshot(post("/api/disconnect")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], json!("disconnected"));
    }
}
