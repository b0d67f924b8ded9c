//! HTTP surface tests, driven through the router without a listener

mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{orchestrator, test_config, MockFactory};

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str) -> Value {
    let (status, body) = send(app, method, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_status_when_idle() {
    let (job, _) = orchestrator(MockFactory::new(b"x"), test_config(4));
    let app = br_daemon::server::router(job);

    let status = send_json(&app, Method::GET, "/status").await;
    assert_eq!(
        status,
        json!({
            "working": false,
            "startedAt": null,
            "lastRun": { "error": "", "startedAt": null }
        })
    );
}

#[tokio::test]
async fn test_press_starts_a_run() {
    let (job, recorder) = orchestrator(MockFactory::new(b"abcdefghij"), test_config(4));
    let app = br_daemon::server::router(job.clone());

    let pressed = send_json(&app, Method::POST, "/press").await;
    assert_eq!(pressed, Value::Null);

    tokio::time::timeout(Duration::from_secs(5), job.wait_idle())
        .await
        .unwrap();

    let status = send_json(&app, Method::GET, "/status").await;
    assert_eq!(status["working"], json!(false));
    assert_eq!(status["lastRun"]["error"], json!(""));
    assert!(status["lastRun"]["startedAt"].is_u64());
    assert_eq!(recorder.delivered_bytes(), b"abcdefghij");
}

#[tokio::test]
async fn test_index_renders_page() {
    let (job, _) = orchestrator(MockFactory::new(b"x"), test_config(4));
    let app = br_daemon::server::router(job);

    let (status, body) = send(&app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);

    let page = String::from_utf8(body).unwrap();
    assert!(page.contains("big-red"));
    assert!(page.contains("Never run"));
}

#[tokio::test]
async fn test_abort_when_idle() {
    let (job, _) = orchestrator(MockFactory::new(b"x"), test_config(4));
    let app = br_daemon::server::router(job);

    let aborted = send_json(&app, Method::POST, "/abort").await;
    assert_eq!(aborted, json!({ "aborted": false }));
}

#[tokio::test]
async fn test_press_requires_post() {
    let (job, recorder) = orchestrator(MockFactory::new(b"x"), test_config(4));
    let app = br_daemon::server::router(job);

    let (status, _) = send(&app, Method::GET, "/press").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(recorder.opened(), 0);
}
