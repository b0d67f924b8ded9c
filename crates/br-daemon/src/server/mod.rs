//! HTTP status surface
//!
//! A small page with a trigger button, plus JSON endpoints for polling.

mod handlers;
mod page;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::job::JobOrchestrator;

/// Build the router for the status surface
pub fn router(job: JobOrchestrator) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/status", get(handlers::status))
        .route("/press", post(handlers::press))
        .route("/abort", post(handlers::abort))
        .with_state(job)
}

/// Serve the status surface until `cancel` fires
pub async fn serve(job: JobOrchestrator, bind_addr: &str, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!("Status page listening on http://{}", local_addr);

    axum::serve(listener, router(job))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;

    tracing::info!("Status page shut down");
    Ok(())
}
