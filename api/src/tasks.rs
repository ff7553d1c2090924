//! In-process registry of active review tasks.
//!
//! One entry per task holds the compiled graph, the run/resume task handles,
//! the SSE event cache, and the documents ingested before the run starts.
//! Completed entries are pruned after the retention window; access is
//! serialized behind one registry lock, with per-task work running on
//! spawned tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use review_graph::{GraphState, ReviewGraph, RunOutcome, TaskDocument};
use session_store::SessionStore;

use crate::sse::EventCache;

/// Live control block for one task.
pub struct TaskEntry {
    pub graph: Arc<ReviewGraph>,
    pub graph_run_id: String,
    pub run_task: Option<JoinHandle<()>>,
    pub resume_task: Option<JoinHandle<()>>,
    pub events: Arc<EventCache>,
    /// Structures ingested by upload jobs, consumed when the run starts.
    pub documents: Vec<TaskDocument>,
    pub domain_id: Option<String>,
    pub domain_subtype: Option<String>,
    pub our_party: String,
    pub language: String,
    pub last_access: Instant,
    pub completed_ts: Option<Instant>,
}

impl TaskEntry {
    pub fn new(graph: Arc<ReviewGraph>, graph_run_id: String) -> Self {
        Self {
            graph,
            graph_run_id,
            run_task: None,
            resume_task: None,
            events: Arc::new(EventCache::default()),
            documents: Vec::new(),
            domain_id: None,
            domain_subtype: None,
            our_party: String::new(),
            language: "en".to_string(),
            last_access: Instant::now(),
            completed_ts: None,
        }
    }
}

/// Process-wide task map with retention-based pruning.
pub struct TaskRegistry {
    entries: Mutex<HashMap<String, TaskEntry>>,
    retention: Duration,
}

impl TaskRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Drops entries whose run completed longer than the retention window
    /// ago. Long-lived SSE subscribers do not postpone pruning; they observe
    /// the task as missing and end their stream.
    pub async fn prune(&self) {
        let mut entries = self.entries.lock().await;
        let retention = self.retention;
        entries.retain(|task_id, entry| {
            let stale = entry
                .completed_ts
                .map(|ts| ts.elapsed() > retention)
                .unwrap_or(false);
            if stale {
                debug!(task_id, "pruning completed task entry");
            }
            !stale
        });
    }

    /// Inserts a fresh entry; `false` when the task already has one.
    pub async fn insert(&self, task_id: &str, entry: TaskEntry) -> bool {
        self.prune().await;
        let mut entries = self.entries.lock().await;
        if entries.contains_key(task_id) {
            return false;
        }
        entries.insert(task_id.to_string(), entry);
        true
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.entries.lock().await.contains_key(task_id)
    }

    /// Runs `f` over the entry with the access timestamp refreshed.
    pub async fn with_entry<R>(
        &self,
        task_id: &str,
        f: impl FnOnce(&mut TaskEntry) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(task_id)?;
        entry.last_access = Instant::now();
        Some(f(entry))
    }

    pub async fn graph_of(&self, task_id: &str) -> Option<Arc<ReviewGraph>> {
        self.with_entry(task_id, |entry| entry.graph.clone()).await
    }

    pub async fn events_of(&self, task_id: &str) -> Option<Arc<EventCache>> {
        self.with_entry(task_id, |entry| entry.events.clone()).await
    }

    /// Records run completion for retention pruning.
    pub async fn mark_completed(&self, task_id: &str) {
        self.with_entry(task_id, |entry| entry.completed_ts = Some(Instant::now()))
            .await;
    }
}

/// Spawns the initial graph run for a task. A panic anywhere in the drive
/// marks the session failed; normal completion stamps `completed_ts` so
/// retention pruning can kick in.
pub async fn spawn_run(
    registry: Arc<TaskRegistry>,
    task_id: &str,
    sessions: Arc<SessionStore>,
    initial_state: GraphState,
) {
    let Some(graph) = registry.graph_of(task_id).await else {
        return;
    };
    let handle = spawn_drive(
        registry.clone(),
        task_id.to_string(),
        sessions,
        graph,
        Some(initial_state),
    );
    registry
        .with_entry(task_id, |entry| entry.run_task = Some(handle))
        .await;
}

/// Spawns a resume. `false` when a resume is already in flight.
pub async fn spawn_resume(
    registry: Arc<TaskRegistry>,
    task_id: &str,
    sessions: Arc<SessionStore>,
) -> bool {
    let in_flight = registry
        .with_entry(task_id, |entry| {
            entry
                .resume_task
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false);
    if in_flight {
        return false;
    }
    let Some(graph) = registry.graph_of(task_id).await else {
        return false;
    };
    let handle = spawn_drive(registry.clone(), task_id.to_string(), sessions, graph, None);
    registry
        .with_entry(task_id, |entry| entry.resume_task = Some(handle))
        .await;
    true
}

/// Drives the graph on a spawned task; the outer task catches panics at the
/// run boundary and records them on the session.
fn spawn_drive(
    registry: Arc<TaskRegistry>,
    task_id: String,
    sessions: Arc<SessionStore>,
    graph: Arc<ReviewGraph>,
    initial: Option<GraphState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let drive = {
            let graph = graph.clone();
            tokio::spawn(async move {
                match initial {
                    Some(state) => graph.invoke(state).await,
                    None => graph.resume().await,
                }
            })
        };

        match drive.await {
            Ok(Ok(RunOutcome::Completed)) => {
                info!(task_id, "graph run completed");
                registry.mark_completed(&task_id).await;
                if let Err(err) = sessions.mark_completed(&task_id).await {
                    error!(task_id, %err, "failed to mark session completed");
                }
            }
            Ok(Ok(RunOutcome::Paused(node))) => {
                info!(task_id, node = node.as_str(), "graph run paused");
            }
            Ok(Err(err)) => {
                error!(task_id, %err, "graph run errored");
                let _ = sessions.mark_failed(&task_id, &err.to_string()).await;
            }
            Err(join_err) => {
                error!(task_id, %join_err, "graph run panicked");
                let _ = sessions
                    .mark_failed(&task_id, &format!("graph run panicked: {join_err}"))
                    .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_graph::engine::MemoryCheckpointer;
    use review_graph::{Checkpointer, GraphContext};

    fn entry() -> TaskEntry {
        let graph = Arc::new(ReviewGraph::new(
            GraphContext::default(),
            Checkpointer::Memory(MemoryCheckpointer::default()),
            None,
        ));
        TaskEntry::new(graph, "run_t1".to_string())
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let registry = TaskRegistry::new(Duration::from_secs(3600));
        assert!(registry.insert("t1", entry()).await);
        assert!(!registry.insert("t1", entry()).await);
    }

    #[tokio::test]
    async fn completed_entries_are_pruned_after_retention() {
        let registry = TaskRegistry::new(Duration::from_millis(0));
        registry.insert("t1", entry()).await;
        registry.mark_completed("t1").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.prune().await;
        assert!(!registry.contains("t1").await);
    }

    #[tokio::test]
    async fn active_entries_survive_pruning() {
        let registry = TaskRegistry::new(Duration::from_millis(0));
        registry.insert("t1", entry()).await;
        registry.prune().await;
        assert!(registry.contains("t1").await);
    }
}
