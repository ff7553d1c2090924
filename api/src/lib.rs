//! HTTP surface of the contract review backend.
//!
//! REST endpoints under `/api/v3` plus the SSE event stream. Handlers are
//! thin: they resolve the task's entry in the in-process registry, read or
//! mutate graph state through the engine's snapshot/update API, and map
//! store errors to 4xx envelopes. All long work (graph runs, resumes, file
//! ingestion) happens on spawned tasks that report through the session and
//! upload-job stores and the per-task SSE event cache.

pub mod core;
pub mod error_handler;
pub mod recovery;
pub mod routes;
pub mod sse;
pub mod tasks;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::core::app_state::AppState;

/// Builds the `/api/v3` router over a prepared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v3/review/start", post(routes::review::start_review))
        .route("/api/v3/review/{task_id}/status", get(routes::review::get_status))
        .route(
            "/api/v3/review/{task_id}/pending-diffs",
            get(routes::review::get_pending_diffs),
        )
        .route("/api/v3/review/{task_id}/approve", post(routes::review::approve_diff))
        .route(
            "/api/v3/review/{task_id}/approve-batch",
            post(routes::review::approve_batch),
        )
        .route("/api/v3/review/{task_id}/resume", post(routes::review::resume_review))
        .route("/api/v3/review/{task_id}/run", post(routes::review::run_review))
        .route("/api/v3/review/{task_id}/result", get(routes::review::get_result))
        .route("/api/v3/review/{task_id}/export", post(routes::review::export_redline))
        .route("/api/v3/review/{task_id}/events", get(routes::review::review_events))
        .route("/api/v3/review/{task_id}/upload", post(routes::uploads::upload_document))
        .route("/api/v3/review/{task_id}/uploads", get(routes::uploads::list_uploads))
        .route(
            "/api/v3/review/{task_id}/uploads/{job_id}/retry",
            post(routes::uploads::retry_upload),
        )
        .route("/api/v3/domains", get(routes::domains::list_domains))
        .route("/api/v3/domains/{domain_id}", get(routes::domains::get_domain))
        .route(
            "/api/v3/domains/{domain_id}/checklist",
            get(routes::domains::get_domain_checklist),
        )
        .with_state(state)
}

/// Boots the backend: state from the environment, recovery pass, serve.
pub async fn start() -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::from_env());
    recovery::recover_on_startup(&state).await;

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "contract review backend listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
