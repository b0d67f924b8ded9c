//! Route handlers

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde_json::{json, Value};

use br_core::JobSnapshot;

use super::page;
use crate::job::JobOrchestrator;

/// `GET /`
pub(super) async fn index(State(job): State<JobOrchestrator>) -> Html<String> {
    Html(page::render(&job.snapshot(), job.elapsed()))
}

/// `GET /status`
pub(super) async fn status(State(job): State<JobOrchestrator>) -> Json<JobSnapshot> {
    Json(job.snapshot())
}

/// `POST /press` starts a run; a press while running is ignored
pub(super) async fn press(State(job): State<JobOrchestrator>) -> Json<Value> {
    if job.try_start().is_none() {
        tracing::debug!("Trigger ignored, run already in progress");
    }
    Json(Value::Null)
}

/// `POST /abort` cancels the in-flight run
pub(super) async fn abort(State(job): State<JobOrchestrator>) -> Json<Value> {
    Json(json!({ "aborted": job.abort() }))
}
