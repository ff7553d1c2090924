//! Review-session persistence (`review_sessions` table).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::StoreResult;
use crate::pack::{pack_graph_state, unpack_graph_state};
use crate::postgrest::PostgrestClient;

const TABLE: &str = "review_sessions";

/// Session control status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Reviewing,
    Interrupted,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Reviewing | SessionStatus::Interrupted)
    }
}

/// One persisted session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRow {
    pub task_id: String,
    pub status: SessionStatus,
    pub domain_id: String,
    pub domain_subtype: String,
    pub our_party: String,
    pub language: String,
    pub current_clause_index: i64,
    pub current_clause_id: String,
    pub total_clauses: i64,
    pub is_complete: bool,
    pub is_interrupted: bool,
    pub error: Option<String>,
    /// Packed on write, unpacked on read.
    pub graph_state: Value,
    pub graph_run_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for SessionRow {
    fn default() -> Self {
        Self {
            task_id: String::new(),
            status: SessionStatus::Reviewing,
            domain_id: String::new(),
            domain_subtype: String::new(),
            our_party: String::new(),
            language: String::new(),
            current_clause_index: 0,
            current_clause_id: String::new(),
            total_clauses: 0,
            is_complete: false,
            is_interrupted: false,
            error: None,
            graph_state: json!({}),
            graph_run_id: String::new(),
            created_at: None,
            updated_at: None,
            completed_at: None,
        }
    }
}

/// Task-level metadata saved alongside the graph snapshot.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub domain_id: String,
    pub our_party: String,
    pub language: String,
    pub graph_run_id: String,
}

enum Backend {
    Memory(Mutex<HashMap<String, SessionRow>>),
    Postgrest(PostgrestClient),
}

/// CRUD helper around the sessions table. Cheap to share behind an `Arc`.
pub struct SessionStore {
    backend: Backend,
}

fn field_str(snapshot: &Value, key: &str) -> String {
    snapshot.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

impl SessionStore {
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    pub fn postgrest(client: PostgrestClient) -> Self {
        Self {
            backend: Backend::Postgrest(client),
        }
    }

    /// PostgREST when the environment is configured, memory otherwise.
    pub fn from_env() -> Arc<Self> {
        match PostgrestClient::from_env() {
            Some(client) => Arc::new(Self::postgrest(client)),
            None => {
                warn!("review_sessions using in-memory fallback store");
                Arc::new(Self::memory())
            }
        }
    }

    /// Idempotent upsert of a session from a graph-state snapshot. The row's
    /// status is derived from the snapshot unless `status` overrides it.
    pub async fn save_session(
        &self,
        task_id: &str,
        meta: &SessionMeta,
        graph_snapshot: &Value,
        status: Option<SessionStatus>,
    ) -> StoreResult<()> {
        let is_complete = graph_snapshot
            .get("is_complete")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let is_interrupted = graph_snapshot
            .get("pending_diffs")
            .and_then(Value::as_array)
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        let derived = if is_complete {
            SessionStatus::Completed
        } else if is_interrupted {
            SessionStatus::Interrupted
        } else {
            SessionStatus::Reviewing
        };
        let status = status.unwrap_or(derived);

        let now = Utc::now();
        let row = SessionRow {
            task_id: task_id.to_string(),
            status,
            domain_id: if meta.domain_id.is_empty() {
                field_str(graph_snapshot, "domain_id")
            } else {
                meta.domain_id.clone()
            },
            domain_subtype: field_str(graph_snapshot, "domain_subtype"),
            our_party: if meta.our_party.is_empty() {
                field_str(graph_snapshot, "our_party")
            } else {
                meta.our_party.clone()
            },
            language: if meta.language.is_empty() {
                field_str(graph_snapshot, "language")
            } else {
                meta.language.clone()
            },
            current_clause_index: graph_snapshot
                .get("current_clause_index")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            current_clause_id: field_str(graph_snapshot, "current_clause_id"),
            total_clauses: graph_snapshot
                .get("review_checklist")
                .and_then(Value::as_array)
                .map(|a| a.len() as i64)
                .unwrap_or(0),
            is_complete,
            is_interrupted,
            error: graph_snapshot
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
            graph_state: pack_graph_state(graph_snapshot),
            graph_run_id: meta.graph_run_id.clone(),
            created_at: None,
            updated_at: Some(now),
            completed_at: (status == SessionStatus::Completed).then_some(now),
        };

        match &self.backend {
            Backend::Memory(map) => {
                let mut map = map.lock().await;
                let entry = map.entry(task_id.to_string()).or_insert_with(|| {
                    let mut fresh = row.clone();
                    fresh.created_at = Some(now);
                    fresh
                });
                let created_at = entry.created_at.or(Some(now));
                *entry = row;
                entry.created_at = created_at;
                Ok(())
            }
            Backend::Postgrest(client) => {
                let mut value = serde_json::to_value(&row)?;
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("created_at");
                }
                client.upsert(TABLE, "task_id", &value).await?;
                Ok(())
            }
        }
    }

    /// Loads a session with its graph state unpacked.
    pub async fn load_session(&self, task_id: &str) -> StoreResult<Option<SessionRow>> {
        match &self.backend {
            Backend::Memory(map) => {
                let map = map.lock().await;
                Ok(map.get(task_id).map(|row| {
                    let mut row = row.clone();
                    row.graph_state = unpack_graph_state(&row.graph_state);
                    row
                }))
            }
            Backend::Postgrest(client) => {
                let rows = client.select_eq(TABLE, "task_id", task_id, None).await?;
                let Some(raw) = rows.into_iter().next() else {
                    return Ok(None);
                };
                let mut row: SessionRow = serde_json::from_value(raw)?;
                row.graph_state = unpack_graph_state(&row.graph_state);
                Ok(Some(row))
            }
        }
    }

    pub async fn update_status(
        &self,
        task_id: &str,
        status: SessionStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Memory(map) => {
                let mut map = map.lock().await;
                let entry = map.entry(task_id.to_string()).or_insert_with(|| SessionRow {
                    task_id: task_id.to_string(),
                    created_at: Some(now),
                    ..Default::default()
                });
                entry.status = status;
                entry.updated_at = Some(now);
                if status == SessionStatus::Completed {
                    entry.is_complete = true;
                    entry.is_interrupted = false;
                    entry.completed_at = Some(now);
                }
                if let Some(error) = error {
                    entry.error = Some(truncate_error(error));
                }
                Ok(())
            }
            Backend::Postgrest(client) => {
                let mut patch = json!({
                    "status": status,
                    "updated_at": now,
                });
                if status == SessionStatus::Completed {
                    patch["is_complete"] = json!(true);
                    patch["is_interrupted"] = json!(false);
                    patch["completed_at"] = json!(now);
                }
                if let Some(error) = error {
                    patch["error"] = json!(truncate_error(error));
                }
                client.update_eq(TABLE, "task_id", task_id, &patch).await
            }
        }
    }

    pub async fn mark_completed(&self, task_id: &str) -> StoreResult<()> {
        self.update_status(task_id, SessionStatus::Completed, None).await
    }

    pub async fn mark_failed(&self, task_id: &str, error: &str) -> StoreResult<()> {
        self.update_status(task_id, SessionStatus::Failed, Some(error)).await
    }

    /// Sessions still worth resuming after a restart.
    pub async fn list_active(&self) -> StoreResult<Vec<SessionRow>> {
        match &self.backend {
            Backend::Memory(map) => {
                let map = map.lock().await;
                Ok(map
                    .values()
                    .filter(|row| row.status.is_active())
                    .map(|row| {
                        let mut row = row.clone();
                        row.graph_state = unpack_graph_state(&row.graph_state);
                        row
                    })
                    .collect())
            }
            Backend::Postgrest(client) => {
                let rows = client
                    .select_in(TABLE, "status", &["reviewing", "interrupted"])
                    .await?;
                let mut out = Vec::with_capacity(rows.len());
                for raw in rows {
                    let mut row: SessionRow = serde_json::from_value(raw)?;
                    row.graph_state = unpack_graph_state(&row.graph_state);
                    out.push(row);
                }
                Ok(out)
            }
        }
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(2000).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(pending: usize, complete: bool) -> Value {
        json!({
            "task_id": "t1",
            "current_clause_index": 1,
            "current_clause_id": "14.2",
            "review_checklist": [{"clause_id": "14.1"}, {"clause_id": "14.2"}],
            "pending_diffs": (0..pending).map(|i| json!({"diff_id": format!("d{i}")})).collect::<Vec<_>>(),
            "is_complete": complete,
        })
    }

    #[tokio::test]
    async fn save_derives_status_from_snapshot() {
        let store = SessionStore::memory();
        let meta = SessionMeta::default();
        store.save_session("t1", &meta, &snapshot(0, false), None).await.unwrap();
        assert_eq!(
            store.load_session("t1").await.unwrap().unwrap().status,
            SessionStatus::Reviewing
        );

        store.save_session("t1", &meta, &snapshot(2, false), None).await.unwrap();
        let row = store.load_session("t1").await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Interrupted);
        assert!(row.is_interrupted);
        assert_eq!(row.total_clauses, 2);

        store.save_session("t1", &meta, &snapshot(0, true), None).await.unwrap();
        let row = store.load_session("t1").await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Completed);
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn upsert_preserves_created_at() {
        let store = SessionStore::memory();
        let meta = SessionMeta::default();
        store.save_session("t1", &meta, &snapshot(0, false), None).await.unwrap();
        let first = store.load_session("t1").await.unwrap().unwrap().created_at;
        store.save_session("t1", &meta, &snapshot(1, false), None).await.unwrap();
        let second = store.load_session("t1").await.unwrap().unwrap().created_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn mark_failed_truncates_error_and_lists_inactive() {
        let store = SessionStore::memory();
        let meta = SessionMeta::default();
        store.save_session("t1", &meta, &snapshot(0, false), None).await.unwrap();
        assert_eq!(store.list_active().await.unwrap().len(), 1);

        let long_error = "x".repeat(5000);
        store.mark_failed("t1", &long_error).await.unwrap();
        let row = store.load_session("t1").await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Failed);
        assert_eq!(row.error.unwrap().len(), 2000);
        assert!(store.list_active().await.unwrap().is_empty());
    }
}
