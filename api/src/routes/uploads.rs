//! Async upload endpoints and the ingestion worker.
//!
//! An upload returns immediately with a queued job; a spawned worker spools
//! the file, parses it into a clause tree, attaches the structure to the
//! task, and reports progress through the job store and the task's SSE
//! event cache.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use contract_model::{StructureParser, generate_id};
use review_graph::{DocumentRole, TaskDocument};

use crate::core::app_state::AppState;
use crate::error_handler::{ApiError, ApiResult};
use crate::sse;

#[derive(Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    /// `primary` (default) or `reference`.
    #[serde(default)]
    pub role: Option<String>,
    /// Raw document text (format extraction is an external collaborator).
    pub content: String,
}

/// `POST /review/{task_id}/upload` — returns `{job_id, status: queued}`
/// immediately; progress flows through SSE.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<Value>> {
    let (our_party, language) = state
        .tasks
        .with_entry(&task_id, |entry| (entry.our_party.clone(), entry.language.clone()))
        .await
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} has no active review flow")))?;

    let role = match request.role.as_deref() {
        None | Some("primary") => "primary",
        Some("reference") => "reference",
        Some(other) => {
            return Err(ApiError::BadRequest(format!("unknown document role '{other}'")));
        }
    };

    let spool_path = spool_path_for(&state.spool_dir, &task_id, &request.filename);
    if let Some(parent) = spool_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| ApiError::Internal(format!("spool unavailable: {err}")))?;
    }
    tokio::fs::write(&spool_path, request.content.as_bytes())
        .await
        .map_err(|err| ApiError::Internal(format!("spool write failed: {err}")))?;

    let job = state
        .uploads
        .create_job(
            &task_id,
            role,
            &request.filename,
            &spool_path.to_string_lossy(),
            &our_party,
            &language,
        )
        .await?;

    info!(task_id, job_id = %job.job_id, role, "upload job queued");
    spawn_ingestion(state.clone(), task_id, job.job_id.clone());
    Ok(Json(json!({
        "job_id": job.job_id,
        "status": "queued",
        "document_id": Value::Null,
    })))
}

/// `GET /review/{task_id}/uploads` — jobs ordered by creation time.
pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let jobs = state.uploads.jobs_by_task(&task_id).await?;
    Ok(Json(json!({ "task_id": task_id, "jobs": jobs })))
}

/// `POST /review/{task_id}/uploads/{job_id}/retry` — 400 unless the job is
/// currently failed.
pub async fn retry_upload(
    State(state): State<Arc<AppState>>,
    Path((task_id, job_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let job = state
        .uploads
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("upload job '{job_id}' not found")))?;
    if job.task_id != task_id {
        return Err(ApiError::NotFound(format!(
            "upload job '{job_id}' does not belong to task {task_id}"
        )));
    }

    state.uploads.mark_queued(&job_id).await?;
    info!(task_id, job_id, "upload job requeued for retry");
    spawn_ingestion(state.clone(), task_id, job_id.clone());
    Ok(Json(json!({ "job_id": job_id, "status": "queued" })))
}

fn spool_path_for(spool_dir: &std::path::Path, task_id: &str, filename: &str) -> PathBuf {
    // Flatten path separators out of client-supplied names.
    let safe_name: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    spool_dir.join(task_id).join(safe_name)
}

/// Spawns the ingestion pipeline for one job:
/// `loading → parsing → finished`, with every stage mirrored to the job
/// store and the SSE cache.
pub fn spawn_ingestion(state: Arc<AppState>, task_id: String, job_id: String) {
    tokio::spawn(async move {
        if let Err(err) = run_ingestion(&state, &task_id, &job_id).await {
            warn!(task_id, job_id, %err, "upload ingestion failed");
            let message = err.to_string();
            if let Err(store_err) = state.uploads.mark_failed(&job_id, &message).await {
                warn!(job_id, %store_err, "failed to record upload failure");
            }
            if let Some(events) = state.tasks.events_of(&task_id).await {
                events.push_pair(sse::upload_error(&job_id, &message)).await;
            }
        }
    });
}

async fn run_ingestion(
    state: &AppState,
    task_id: &str,
    job_id: &str,
) -> Result<(), IngestionError> {
    let job = state
        .uploads
        .get_job(job_id)
        .await?
        .ok_or(IngestionError::JobGone)?;
    state.uploads.mark_running(job_id).await?;

    let events = state.tasks.events_of(task_id).await;
    let progress = |stage: &'static str, pct: u8| {
        let events = events.clone();
        async move {
            if let Some(events) = events {
                events
                    .push_pair(sse::upload_progress(job_id, stage, pct))
                    .await;
            }
        }
    };

    state.uploads.update_stage(job_id, "loading", 10).await?;
    progress("loading", 10).await;
    let content = tokio::fs::read_to_string(&job.storage_key)
        .await
        .map_err(|err| IngestionError::Load(err.to_string()))?;
    if content.trim().is_empty() {
        return Err(IngestionError::Parse("document is empty".to_string()));
    }

    state.uploads.update_stage(job_id, "parsing", 60).await?;
    progress("parsing", 60).await;
    let document_id = generate_id("doc");
    let structure = StructureParser::detect(&content).parse(&content, &document_id);
    if structure.total_clauses == 0 {
        return Err(IngestionError::Parse("no clauses recognized".to_string()));
    }

    let role = if job.role == "reference" {
        DocumentRole::Reference
    } else {
        DocumentRole::Primary
    };
    let total_clauses = structure.total_clauses;
    let attached = state
        .tasks
        .with_entry(task_id, |entry| {
            entry.documents.push(TaskDocument {
                document_id: document_id.clone(),
                role,
                filename: job.filename.clone(),
                structure: Some(structure),
            });
        })
        .await
        .is_some();
    if !attached {
        return Err(IngestionError::TaskGone);
    }

    let result_meta = json!({
        "document_id": document_id,
        "total_clauses": total_clauses,
    });
    state.uploads.mark_succeeded(job_id, result_meta.clone()).await?;
    if let Some(events) = state.tasks.events_of(task_id).await {
        events
            .push_pair(sse::upload_complete(job_id, &document_id, &result_meta))
            .await;
    }
    info!(task_id, job_id, document_id, total_clauses, "upload ingested");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum IngestionError {
    #[error("upload job disappeared")]
    JobGone,
    #[error("task has no active review flow")]
    TaskGone,
    #[error("failed to load document: {0}")]
    Load(String),
    #[error("failed to parse document: {0}")]
    Parse(String),
    #[error(transparent)]
    Store(#[from] session_store::StoreError),
}
