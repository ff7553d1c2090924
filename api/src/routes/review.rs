//! Review lifecycle endpoints and the SSE event stream.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use contract_model::RiskLevel;
use contract_model::plugin::get_review_checklist;
use review_graph::engine::SessionCheckpointer;
use review_graph::{
    Checkpointer, DocumentRole, GraphContext, GraphState, ReviewGraph, StateUpdate,
};

use crate::core::app_state::AppState;
use crate::error_handler::{ApiError, ApiResult};
use crate::sse::{self, SseEventType};
use crate::tasks::{TaskEntry, spawn_resume, spawn_run};

const SSE_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
pub struct StartReviewRequest {
    pub task_id: String,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub domain_subtype: Option<String>,
    #[serde(default)]
    pub our_party: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Deserialize)]
pub struct ApprovalRequest {
    pub diff_id: String,
    pub decision: String,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Deserialize)]
pub struct BatchApprovalRequest {
    pub approvals: Vec<ApprovalRequest>,
}

/// `POST /review/start` — create a review task. 409 when an active flow for
/// the task already exists.
pub async fn start_review(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartReviewRequest>,
) -> ApiResult<Json<Value>> {
    state.tasks.prune().await;
    let task_id = request.task_id.clone();
    if state.tasks.contains(&task_id).await {
        return Err(ApiError::Conflict(format!(
            "task {task_id} already has an active review flow"
        )));
    }

    let graph_run_id = format!("run_{task_id}");
    let graph = Arc::new(ReviewGraph::new(
        GraphContext {
            llm: state.llm.clone(),
            dispatcher: Some(state.dispatcher.clone()),
            settings: state.settings.clone(),
        },
        Checkpointer::Session(SessionCheckpointer::new(
            state.sessions.clone(),
            graph_run_id.clone(),
        )),
        None,
    ));

    let language = request.language.clone().unwrap_or_else(|| "en".to_string());
    let mut entry = TaskEntry::new(graph, graph_run_id.clone());
    entry.domain_id = request.domain_id.clone();
    entry.domain_subtype = request.domain_subtype.clone();
    entry.our_party = request.our_party.clone();
    entry.language = language.clone();
    if !state.tasks.insert(&task_id, entry).await {
        return Err(ApiError::Conflict(format!(
            "task {task_id} already has an active review flow"
        )));
    }

    // Seed the session row so the task is recoverable before the run starts.
    let seed = json!({
        "task_id": &task_id,
        "domain_id": &request.domain_id,
        "our_party": &request.our_party,
        "language": &language,
    });
    state
        .sessions
        .save_session(
            &task_id,
            &session_store::SessionMeta {
                domain_id: request.domain_id.unwrap_or_default(),
                our_party: request.our_party,
                language,
                graph_run_id: graph_run_id.clone(),
            },
            &seed,
            None,
        )
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    info!(task_id, "review task created");
    Ok(Json(json!({
        "task_id": task_id,
        "status": "created",
        "graph_run_id": graph_run_id,
    })))
}

/// `POST /review/{task_id}/run` — begin graph execution. 400 without a
/// primary document.
pub async fn run_review(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let setup = state
        .tasks
        .with_entry(&task_id, |entry| {
            let running = entry
                .run_task
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false);
            (
                running,
                entry.documents.clone(),
                entry.domain_id.clone(),
                entry.domain_subtype.clone(),
                entry.our_party.clone(),
                entry.language.clone(),
            )
        })
        .await
        .ok_or_else(|| task_not_found(&task_id))?;
    let (running, documents, domain_id, domain_subtype, our_party, language) = setup;
    if running {
        return Err(ApiError::Conflict(format!(
            "task {task_id} already has a run in flight"
        )));
    }

    if !documents.iter().any(|d| d.role == DocumentRole::Primary) {
        return Err(ApiError::BadRequest(format!(
            "task {task_id} has no primary document; upload one before running"
        )));
    }

    let checklist = domain_id
        .as_deref()
        .map(|d| get_review_checklist(d, domain_subtype.as_deref()))
        .unwrap_or_default();

    let initial_state = GraphState {
        task_id: task_id.clone(),
        our_party,
        language,
        material_type: "contract".to_string(),
        domain_id,
        domain_subtype,
        documents,
        review_checklist: checklist,
        ..Default::default()
    };

    spawn_run(
        state.tasks.clone(),
        &task_id,
        state.sessions.clone(),
        initial_state,
    )
    .await;
    Ok(Json(json!({ "task_id": task_id, "status": "running" })))
}

/// `GET /review/{task_id}/status`.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.tasks.prune().await;
    let (graph, graph_run_id) = state
        .tasks
        .with_entry(&task_id, |entry| (entry.graph.clone(), entry.graph_run_id.clone()))
        .await
        .ok_or_else(|| task_not_found(&task_id))?;

    let snapshot = graph.state_snapshot().await;
    if snapshot.values.is_complete {
        state.tasks.mark_completed(&task_id).await;
    }
    Ok(Json(json!({
        "task_id": task_id,
        "graph_run_id": graph_run_id,
        "next_nodes": snapshot.next_nodes,
        "is_interrupted": !snapshot.next_nodes.is_empty(),
        "current_clause_id": snapshot.values.current_clause_id,
        "current_clause_index": snapshot.values.current_clause_index,
        "total_clauses": snapshot.values.review_checklist.len(),
        "is_complete": snapshot.values.is_complete,
        "error": snapshot.values.error,
    })))
}

/// `GET /review/{task_id}/pending-diffs` — the interrupt payload.
pub async fn get_pending_diffs(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let graph = state
        .tasks
        .graph_of(&task_id)
        .await
        .ok_or_else(|| task_not_found(&task_id))?;
    let snapshot = graph.state_snapshot().await;
    Ok(Json(json!({
        "task_id": task_id,
        "pending_diffs": snapshot.values.pending_diffs,
        "clause_id": snapshot.values.current_clause_id,
    })))
}

async fn apply_decisions(
    state: &AppState,
    task_id: &str,
    approvals: &[ApprovalRequest],
) -> ApiResult<Vec<Value>> {
    let graph = state
        .tasks
        .graph_of(task_id)
        .await
        .ok_or_else(|| task_not_found(task_id))?;

    let snapshot = graph.state_snapshot().await;
    let mut decisions = snapshot.values.user_decisions.clone();
    let mut feedback = snapshot.values.user_feedback.clone();
    let mut results = Vec::with_capacity(approvals.len());

    for approval in approvals {
        decisions.insert(approval.diff_id.clone(), approval.decision.clone());
        if let Some(text) = &approval.feedback {
            feedback.insert(approval.diff_id.clone(), text.clone());
        }
        let (new_status, event) = match approval.decision.as_str() {
            "approve" => ("approved", SseEventType::DiffApproved),
            "revise" => ("revised", SseEventType::DiffRevised),
            _ => ("rejected", SseEventType::DiffRejected),
        };
        if let Some(events) = state.tasks.events_of(task_id).await {
            events
                .push_pair(sse::diff_decision(event, &approval.diff_id))
                .await;
        }
        results.push(json!({ "diff_id": approval.diff_id, "new_status": new_status }));
    }

    graph
        .update_state(StateUpdate {
            user_decisions: Some(decisions),
            user_feedback: Some(feedback),
            ..Default::default()
        })
        .await;
    Ok(results)
}

/// `POST /review/{task_id}/approve` — one diff decision.
pub async fn approve_diff(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(request): Json<ApprovalRequest>,
) -> ApiResult<Json<Value>> {
    let results = apply_decisions(&state, &task_id, std::slice::from_ref(&request)).await?;
    let new_status = results[0]["new_status"].clone();
    Ok(Json(json!({
        "diff_id": request.diff_id,
        "new_status": new_status,
        "message": format!("diff {} {}", request.diff_id, new_status.as_str().unwrap_or("updated")),
    })))
}

/// `POST /review/{task_id}/approve-batch`.
pub async fn approve_batch(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(request): Json<BatchApprovalRequest>,
) -> ApiResult<Json<Value>> {
    let results = apply_decisions(&state, &task_id, &request.approvals).await?;
    Ok(Json(json!({ "task_id": task_id, "results": results })))
}

/// `POST /review/{task_id}/resume` — idempotent while a resume is in
/// flight.
pub async fn resume_review(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.tasks.contains(&task_id).await {
        return Err(task_not_found(&task_id));
    }
    let started = spawn_resume(state.tasks.clone(), &task_id, state.sessions.clone()).await;
    let status = if started { "resumed" } else { "resuming" };
    Ok(Json(json!({ "task_id": task_id, "status": status })))
}

/// `GET /review/{task_id}/result` — terminal report; 400 until complete.
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let graph = state
        .tasks
        .graph_of(&task_id)
        .await
        .ok_or_else(|| task_not_found(&task_id))?;
    let values = graph.state_snapshot().await.values;
    if !values.is_complete {
        return Err(ApiError::BadRequest(format!(
            "task {task_id} is not complete yet"
        )));
    }

    let count = |level: RiskLevel| {
        values
            .all_risks
            .iter()
            .filter(|r| r.risk_level == level)
            .count()
    };
    Ok(Json(json!({
        "task_id": task_id,
        "summary": values.summary_notes,
        "total_clauses": values.review_checklist.len(),
        "total_risks": values.all_risks.len(),
        "risk_counts": {
            "high": count(RiskLevel::High),
            "medium": count(RiskLevel::Medium),
            "low": count(RiskLevel::Low),
        },
        "total_diffs": values.all_diffs.len(),
        "findings": values.findings,
    })))
}

/// `POST /review/{task_id}/export` — redline export descriptor. 400 unless
/// the source document is a docx (the writer itself is an external
/// collaborator consuming this payload).
pub async fn export_redline(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let documents = state
        .tasks
        .with_entry(&task_id, |entry| entry.documents.clone())
        .await
        .ok_or_else(|| task_not_found(&task_id))?;
    let primary = documents
        .iter()
        .find(|d| d.role == DocumentRole::Primary)
        .ok_or_else(|| ApiError::BadRequest(format!("task {task_id} has no primary document")))?;
    if !primary.filename.to_lowercase().ends_with(".docx") {
        return Err(ApiError::BadRequest(
            "redline export requires a docx source document".to_string(),
        ));
    }

    let graph = state
        .tasks
        .graph_of(&task_id)
        .await
        .ok_or_else(|| task_not_found(&task_id))?;
    let values = graph.state_snapshot().await.values;
    Ok(Json(json!({
        "task_id": task_id,
        "source_filename": primary.filename,
        "document_id": primary.document_id,
        "diffs": values.all_diffs,
    })))
}

/// `GET /review/{task_id}/events` — SSE stream. Replays the cached events
/// first, then polls the graph state, deduping already-pushed diff ids, and
/// ends on completion or when the task disappears.
pub async fn review_events(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    let stream = async_stream::stream! {
        state.tasks.prune().await;
        let mut pushed_diff_ids: HashSet<String> = HashSet::new();
        let mut last_clause_index: Option<usize> = None;

        // Replay events emitted before this client connected.
        if let Some(events) = state.tasks.events_of(&task_id).await {
            for event in events.replay().await {
                if event.event_type == SseEventType::DiffProposed {
                    if let Some(id) = event.data.get("diff_id").and_then(Value::as_str) {
                        pushed_diff_ids.insert(id.to_string());
                    }
                }
                yield Ok::<_, std::convert::Infallible>(event.encode());
            }
        }

        loop {
            let Some(graph) = state.tasks.graph_of(&task_id).await else {
                let (event, data) = sse::review_error("review flow not found");
                yield Ok(sse::format_sse_event(event, &data, None));
                break;
            };
            let snapshot = graph.state_snapshot().await;
            let values = &snapshot.values;

            if last_clause_index != Some(values.current_clause_index) {
                last_clause_index = Some(values.current_clause_index);
                let (event, data) = sse::review_progress(
                    &task_id,
                    values.current_clause_index,
                    values.review_checklist.len(),
                    &values.current_clause_id,
                );
                yield Ok(sse::format_sse_event(event, &data, None));
            }

            if !snapshot.next_nodes.is_empty() && !values.pending_diffs.is_empty() {
                let mut newly_pushed = 0;
                for diff in &values.pending_diffs {
                    if !pushed_diff_ids.insert(diff.diff_id.clone()) {
                        continue;
                    }
                    newly_pushed += 1;
                    let data = serde_json::to_value(diff).unwrap_or_default();
                    yield Ok(sse::format_sse_event(
                        SseEventType::DiffProposed,
                        &data,
                        Some(&diff.diff_id),
                    ));
                }
                if newly_pushed > 0 {
                    let (event, data) =
                        sse::approval_required(&task_id, values.pending_diffs.len());
                    yield Ok(sse::format_sse_event(event, &data, None));
                }
            }

            if values.is_complete {
                state.tasks.mark_completed(&task_id).await;
                let (event, data) = sse::review_complete(&task_id, &values.summary_notes);
                yield Ok(sse::format_sse_event(event, &data, None));
                break;
            }

            tokio::time::sleep(SSE_POLL_INTERVAL).await;
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn task_not_found(task_id: &str) -> ApiError {
    ApiError::NotFound(format!("task {task_id} has no active review flow"))
}
