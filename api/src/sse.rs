//! SSE protocol: typed event encoder and the per-task replay cache.
//!
//! Wire format per event:
//!
//! ```text
//! event: <type>
//! [id: <event_id>]
//! data: <json>
//!
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// The closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SseEventType {
    // upload worker
    UploadProgress,
    UploadComplete,
    UploadError,
    // review flow
    ReviewProgress,
    DiffProposed,
    DiffApproved,
    DiffRejected,
    DiffRevised,
    ReviewComplete,
    ReviewError,
    ApprovalRequired,
    // interactive refinement
    ToolThinking,
    ToolCall,
    ToolResult,
    ToolError,
    DocUpdate,
    MessageDelta,
    MessageDone,
    SuggestionUpdate,
    Error,
    Done,
}

impl SseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SseEventType::UploadProgress => "upload_progress",
            SseEventType::UploadComplete => "upload_complete",
            SseEventType::UploadError => "upload_error",
            SseEventType::ReviewProgress => "review_progress",
            SseEventType::DiffProposed => "diff_proposed",
            SseEventType::DiffApproved => "diff_approved",
            SseEventType::DiffRejected => "diff_rejected",
            SseEventType::DiffRevised => "diff_revised",
            SseEventType::ReviewComplete => "review_complete",
            SseEventType::ReviewError => "review_error",
            SseEventType::ApprovalRequired => "approval_required",
            SseEventType::ToolThinking => "tool_thinking",
            SseEventType::ToolCall => "tool_call",
            SseEventType::ToolResult => "tool_result",
            SseEventType::ToolError => "tool_error",
            SseEventType::DocUpdate => "doc_update",
            SseEventType::MessageDelta => "message_delta",
            SseEventType::MessageDone => "message_done",
            SseEventType::SuggestionUpdate => "suggestion_update",
            SseEventType::Error => "error",
            SseEventType::Done => "done",
        }
    }
}

/// Formats one event in SSE wire format.
pub fn format_sse_event(event_type: SseEventType, data: &Value, event_id: Option<&str>) -> String {
    let mut out = format!("event: {}\n", event_type.as_str());
    if let Some(id) = event_id {
        out.push_str(&format!("id: {id}\n"));
    }
    out.push_str(&format!("data: {data}\n\n"));
    out
}

// Typed constructors for the payloads the spec fixes.

pub fn upload_progress(job_id: &str, stage: &str, progress: u8) -> (SseEventType, Value) {
    (
        SseEventType::UploadProgress,
        json!({"job_id": job_id, "stage": stage, "progress": progress}),
    )
}

pub fn upload_complete(job_id: &str, document_id: &str, result_meta: &Value) -> (SseEventType, Value) {
    (
        SseEventType::UploadComplete,
        json!({"job_id": job_id, "document_id": document_id, "result_meta": result_meta}),
    )
}

pub fn upload_error(job_id: &str, error: &str) -> (SseEventType, Value) {
    (
        SseEventType::UploadError,
        json!({"job_id": job_id, "error": error}),
    )
}

pub fn review_progress(
    task_id: &str,
    current_clause_index: usize,
    total_clauses: usize,
    current_clause_id: &str,
) -> (SseEventType, Value) {
    (
        SseEventType::ReviewProgress,
        json!({
            "task_id": task_id,
            "current_clause_index": current_clause_index,
            "total_clauses": total_clauses,
            "current_clause_id": current_clause_id,
            "message": format!(
                "reviewing clause {}/{}",
                current_clause_index + 1,
                total_clauses.max(1)
            ),
        }),
    )
}

pub fn approval_required(task_id: &str, pending_count: usize) -> (SseEventType, Value) {
    (
        SseEventType::ApprovalRequired,
        json!({"task_id": task_id, "pending_count": pending_count}),
    )
}

pub fn review_complete(task_id: &str, summary: &str) -> (SseEventType, Value) {
    (
        SseEventType::ReviewComplete,
        json!({"task_id": task_id, "summary": summary}),
    )
}

pub fn review_error(message: &str) -> (SseEventType, Value) {
    (SseEventType::ReviewError, json!({"message": message}))
}

pub fn diff_decision(event: SseEventType, diff_id: &str) -> (SseEventType, Value) {
    (event, json!({"diff_id": diff_id}))
}

/// One cached event.
#[derive(Debug, Clone)]
pub struct CachedEvent {
    pub event_type: SseEventType,
    pub data: Value,
    pub event_id: Option<String>,
}

impl CachedEvent {
    pub fn encode(&self) -> String {
        format_sse_event(self.event_type, &self.data, self.event_id.as_deref())
    }
}

/// Bounded per-task ring of recent events, replayed to clients that connect
/// after the events fired (upload events in particular).
pub struct EventCache {
    capacity: usize,
    events: Mutex<VecDeque<CachedEvent>>,
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, event_type: SseEventType, data: Value, event_id: Option<String>) {
        let mut events = self.events.lock().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(CachedEvent {
            event_type,
            data,
            event_id,
        });
    }

    pub async fn push_pair(&self, pair: (SseEventType, Value)) {
        self.push(pair.0, pair.1, None).await;
    }

    /// Snapshot of the cached events, oldest first.
    pub async fn replay(&self) -> Vec<CachedEvent> {
        self.events.lock().await.iter().cloned().collect()
    }
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_format_matches_sse_spec() {
        let encoded = format_sse_event(
            SseEventType::DiffProposed,
            &json!({"diff_id": "d1"}),
            Some("d1"),
        );
        assert_eq!(encoded, "event: diff_proposed\nid: d1\ndata: {\"diff_id\":\"d1\"}\n\n");
    }

    #[test]
    fn event_without_id_omits_id_line() {
        let encoded = format_sse_event(SseEventType::Done, &json!({}), None);
        assert_eq!(encoded, "event: done\ndata: {}\n\n");
    }

    #[tokio::test]
    async fn cache_is_bounded_and_replays_in_order() {
        let cache = EventCache::new(2);
        for i in 0..3 {
            cache
                .push(SseEventType::UploadProgress, json!({"progress": i}), None)
                .await;
        }
        let replayed = cache.replay().await;
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].data["progress"], 1);
        assert_eq!(replayed[1].data["progress"], 2);
    }
}
