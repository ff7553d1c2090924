//! Hand-written graph dispatcher: node table, conditional edges, checkpoint
//! hook, interrupt-before.
//!
//! The node set is fixed; conditional edges are pure functions of state. An
//! interrupt node (by default `human_approval`) runs its entry update — so
//! the paused snapshot already exposes `pending_diffs` — and then the engine
//! returns to the caller. `resume` routes onward from the paused node
//! without re-running it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use ai_llm_service::LlmClient;
use session_store::{SessionMeta, SessionStore};
use skill_dispatch::SkillDispatcher;

use crate::errors::{GraphError, GraphResult};
use crate::nodes;
use crate::settings::{ExecutionMode, GraphSettings};
use crate::state::{GraphState, StateUpdate};

/// The fixed node set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Init,
    ParseDocument,
    PlanReview,
    ClauseAnalyze,
    ClauseGenerateDiffs,
    ClauseValidate,
    HumanApproval,
    SaveClause,
    Summarize,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Init => "init",
            NodeKind::ParseDocument => "parse_document",
            NodeKind::PlanReview => "plan_review",
            NodeKind::ClauseAnalyze => "clause_analyze",
            NodeKind::ClauseGenerateDiffs => "clause_generate_diffs",
            NodeKind::ClauseValidate => "clause_validate",
            NodeKind::HumanApproval => "human_approval",
            NodeKind::SaveClause => "save_clause",
            NodeKind::Summarize => "summarize",
        }
    }
}

/// Shared collaborators for node execution.
#[derive(Clone, Default)]
pub struct GraphContext {
    pub llm: Option<Arc<LlmClient>>,
    pub dispatcher: Option<Arc<SkillDispatcher>>,
    pub settings: GraphSettings,
}

/// How a drive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused(NodeKind),
}

/// Externally readable view of a run.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub values: GraphState,
    /// Non-empty exactly while the run is paused at an interrupt node.
    pub next_nodes: Vec<String>,
}

/// Where checkpoints go. The engine never talks to storage directly.
pub enum Checkpointer {
    Memory(MemoryCheckpointer),
    Session(SessionCheckpointer),
}

/// In-process checkpoint map, for tests and storeless runs.
#[derive(Default)]
pub struct MemoryCheckpointer {
    states: Mutex<HashMap<String, Value>>,
}

/// Durable checkpoints through the session store.
pub struct SessionCheckpointer {
    store: Arc<SessionStore>,
    graph_run_id: String,
}

impl SessionCheckpointer {
    pub fn new(store: Arc<SessionStore>, graph_run_id: impl Into<String>) -> Self {
        Self {
            store,
            graph_run_id: graph_run_id.into(),
        }
    }
}

impl Checkpointer {
    /// Persists a state snapshot. Persistence failures are logged, never
    /// fatal: the in-memory run continues and the client may observe stale
    /// state across a restart.
    pub async fn save(&self, state: &GraphState) {
        match self {
            Checkpointer::Memory(inner) => {
                if let Ok(value) = serde_json::to_value(state) {
                    inner.states.lock().await.insert(state.task_id.clone(), value);
                }
            }
            Checkpointer::Session(inner) => {
                let Ok(snapshot) = serde_json::to_value(state) else {
                    warn!(task_id = %state.task_id, "graph state not serializable, checkpoint skipped");
                    return;
                };
                let meta = SessionMeta {
                    domain_id: state.domain_id.clone().unwrap_or_default(),
                    our_party: state.our_party.clone(),
                    language: state.language.clone(),
                    graph_run_id: inner.graph_run_id.clone(),
                };
                if let Err(err) = inner
                    .store
                    .save_session(&state.task_id, &meta, &snapshot, None)
                    .await
                {
                    warn!(task_id = %state.task_id, %err, "session checkpoint failed, continuing in memory");
                }
            }
        }
    }

    /// Loads the last saved state for a task, if any.
    pub async fn load(&self, task_id: &str) -> Option<GraphState> {
        match self {
            Checkpointer::Memory(inner) => {
                let states = inner.states.lock().await;
                states
                    .get(task_id)
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
            }
            Checkpointer::Session(inner) => {
                let row = inner.store.load_session(task_id).await.ok()??;
                serde_json::from_value(row.graph_state).ok()
            }
        }
    }
}

struct Shared {
    state: GraphState,
    next: Option<NodeKind>,
    /// True while paused at an interrupt node whose entry update already ran.
    interrupted: bool,
}

/// A compiled review graph bound to one task.
pub struct ReviewGraph {
    ctx: GraphContext,
    interrupt_before: Vec<NodeKind>,
    checkpointer: Checkpointer,
    shared: RwLock<Shared>,
    /// Serializes drives; snapshot reads stay possible mid-run.
    drive_lock: Mutex<()>,
}

impl ReviewGraph {
    /// Builds a graph with the default interrupt set (`human_approval`).
    pub fn new(
        ctx: GraphContext,
        checkpointer: Checkpointer,
        interrupt_before: Option<Vec<NodeKind>>,
    ) -> Self {
        Self {
            ctx,
            interrupt_before: interrupt_before.unwrap_or_else(|| vec![NodeKind::HumanApproval]),
            checkpointer,
            shared: RwLock::new(Shared {
                state: GraphState::default(),
                next: None,
                interrupted: false,
            }),
            drive_lock: Mutex::new(()),
        }
    }

    /// Starts a fresh run from `init`.
    pub async fn invoke(&self, initial: GraphState) -> GraphResult<RunOutcome> {
        {
            let mut shared = self.shared.write().await;
            shared.state = initial;
            shared.next = Some(NodeKind::Init);
            shared.interrupted = false;
        }
        self.drive().await
    }

    /// Continues a paused (or restored) run.
    pub async fn resume(&self) -> GraphResult<RunOutcome> {
        {
            let shared = self.shared.read().await;
            if shared.next.is_none() {
                return Err(GraphError::NothingToResume(shared.state.task_id.clone()));
            }
        }
        self.drive().await
    }

    /// Rehydrates a run from a persisted state, e.g. after restart. The
    /// engine re-enters at `next` (paused interrupt nodes are not re-run
    /// when `interrupted` is set).
    pub async fn restore(&self, state: GraphState, next: Option<NodeKind>, interrupted: bool) {
        let mut shared = self.shared.write().await;
        shared.state = state;
        shared.next = next;
        shared.interrupted = interrupted;
    }

    /// Reloads the last checkpoint for `task_id` into this graph, paused at
    /// `human_approval` when the checkpoint carried pending diffs.
    pub async fn restore_from_checkpoint(&self, task_id: &str) -> bool {
        let Some(state) = self.checkpointer.load(task_id).await else {
            return false;
        };
        let (next, interrupted) = if state.is_complete {
            (None, false)
        } else if !state.pending_diffs.is_empty() {
            (Some(NodeKind::HumanApproval), true)
        } else {
            (Some(NodeKind::ClauseAnalyze), false)
        };
        self.restore(state, next, interrupted).await;
        true
    }

    pub async fn state_snapshot(&self) -> StateSnapshot {
        let shared = self.shared.read().await;
        let next_nodes = if shared.interrupted {
            shared
                .next
                .map(|n| vec![n.as_str().to_string()])
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        StateSnapshot {
            values: shared.state.clone(),
            next_nodes,
        }
    }

    pub async fn is_interrupted(&self) -> bool {
        self.shared.read().await.interrupted
    }

    /// Merges an external partial update (approval decisions) and persists.
    pub async fn update_state(&self, update: StateUpdate) {
        let state = {
            let mut shared = self.shared.write().await;
            shared.state.apply(update);
            shared.state.clone()
        };
        self.checkpointer.save(&state).await;
    }

    async fn drive(&self) -> GraphResult<RunOutcome> {
        let _guard = self.drive_lock.lock().await;
        loop {
            let (node, interrupted, state) = {
                let shared = self.shared.read().await;
                (shared.next, shared.interrupted, shared.state.clone())
            };
            let Some(node) = node else {
                info!(task_id = %state.task_id, "graph run complete");
                return Ok(RunOutcome::Completed);
            };

            if interrupted {
                // Paused here previously; route onward without re-running.
                let next = self.route(node, &state);
                let mut shared = self.shared.write().await;
                shared.interrupted = false;
                shared.next = next;
                continue;
            }

            debug!(task_id = %state.task_id, node = node.as_str(), "running node");
            let update = self.run_node(node, &state).await;
            let new_state = {
                let mut shared = self.shared.write().await;
                shared.state.apply(update);
                shared.state.clone()
            };
            self.checkpointer.save(&new_state).await;

            if self.interrupt_before.contains(&node) {
                let mut shared = self.shared.write().await;
                shared.interrupted = true;
                shared.next = Some(node);
                drop(shared);
                info!(task_id = %new_state.task_id, node = node.as_str(), "graph paused at interrupt");
                return Ok(RunOutcome::Paused(node));
            }

            let next = self.route(node, &new_state);
            self.shared.write().await.next = next;
        }
    }

    async fn run_node(&self, node: NodeKind, state: &GraphState) -> StateUpdate {
        match node {
            NodeKind::Init => nodes::node_init(state),
            NodeKind::ParseDocument => nodes::node_parse_document(state),
            NodeKind::PlanReview => nodes::node_plan_review(state, &self.ctx).await,
            NodeKind::ClauseAnalyze => nodes::node_clause_analyze(state, &self.ctx).await,
            NodeKind::ClauseGenerateDiffs => {
                nodes::node_clause_generate_diffs(state, &self.ctx).await
            }
            NodeKind::ClauseValidate => nodes::node_clause_validate(state, &self.ctx).await,
            NodeKind::HumanApproval => nodes::node_human_approval(state),
            NodeKind::SaveClause => nodes::node_save_clause(state, &self.ctx).await,
            NodeKind::Summarize => nodes::node_summarize(state, &self.ctx).await,
        }
    }

    fn route(&self, node: NodeKind, state: &GraphState) -> Option<NodeKind> {
        let gen3 = self.ctx.settings.mode == ExecutionMode::Gen3;
        match node {
            NodeKind::Init => Some(NodeKind::ParseDocument),
            NodeKind::ParseDocument => {
                if gen3 {
                    Some(NodeKind::PlanReview)
                } else {
                    Some(nodes::route_next_clause_or_end(state))
                }
            }
            NodeKind::PlanReview => Some(nodes::route_next_clause_or_end(state)),
            NodeKind::ClauseAnalyze => {
                if gen3 {
                    Some(nodes::route_after_analyze(state))
                } else {
                    Some(NodeKind::ClauseGenerateDiffs)
                }
            }
            NodeKind::ClauseGenerateDiffs => Some(NodeKind::ClauseValidate),
            NodeKind::ClauseValidate => Some(nodes::route_validation(state)),
            NodeKind::HumanApproval => Some(NodeKind::SaveClause),
            NodeKind::SaveClause => Some(nodes::route_next_clause_or_end(state)),
            NodeKind::Summarize => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;

    fn initial_state() -> GraphState {
        let structure = StructureParser::generic()
            .parse("14.1 Payment terms.\n14.2 Advance payment.\n17.6 Liability cap.\n", "doc");
        GraphState {
            task_id: "t1".to_string(),
            language: "en".to_string(),
            primary_structure: Some(structure),
            ..Default::default()
        }
    }

    fn graph() -> ReviewGraph {
        ReviewGraph::new(
            GraphContext::default(),
            Checkpointer::Memory(MemoryCheckpointer::default()),
            None,
        )
    }

    #[tokio::test]
    async fn storeless_run_completes_deterministically() {
        let graph = graph();
        // No LLM, no dispatcher: every clause takes the deterministic path,
        // produces no diffs, and sails through approval.
        let outcome = graph.invoke(initial_state()).await.unwrap();
        // Empty diffs still pass through the human_approval interrupt.
        let mut outcome = outcome;
        let mut hops = 0;
        while let RunOutcome::Paused(node) = outcome {
            assert_eq!(node, NodeKind::HumanApproval);
            outcome = graph.resume().await.unwrap();
            hops += 1;
            assert!(hops <= 3, "more interrupts than clauses");
        }
        let snapshot = graph.state_snapshot().await;
        assert!(snapshot.values.is_complete);
        assert_eq!(snapshot.values.current_clause_index, 3);
        assert!(snapshot.next_nodes.is_empty());
        assert!(!snapshot.values.summary_notes.is_empty());
    }

    #[tokio::test]
    async fn paused_snapshot_exposes_next_node() {
        let graph = graph();
        let outcome = graph.invoke(initial_state()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Paused(NodeKind::HumanApproval));
        let snapshot = graph.state_snapshot().await;
        assert_eq!(snapshot.next_nodes, vec!["human_approval"]);
        assert!(graph.is_interrupted().await);
    }

    #[tokio::test]
    async fn clause_index_is_monotonic() {
        let graph = graph();
        let mut last_index = 0;
        let mut outcome = graph.invoke(initial_state()).await.unwrap();
        while let RunOutcome::Paused(_) = outcome {
            let index = graph.state_snapshot().await.values.current_clause_index;
            assert!(index >= last_index);
            last_index = index;
            outcome = graph.resume().await.unwrap();
        }
        let final_state = graph.state_snapshot().await.values;
        assert_eq!(final_state.current_clause_index, final_state.review_checklist.len());
    }

    #[tokio::test]
    async fn resume_without_run_is_an_error() {
        let graph = graph();
        assert!(matches!(
            graph.resume().await.unwrap_err(),
            GraphError::NothingToResume(_)
        ));
    }

    #[tokio::test]
    async fn checkpoint_restores_paused_run() {
        let checkpointer = Checkpointer::Memory(MemoryCheckpointer::default());
        let graph = ReviewGraph::new(GraphContext::default(), checkpointer, None);
        graph.invoke(initial_state()).await.unwrap();

        // Simulate restart: a new graph over the same checkpointer payload.
        let saved = graph.checkpointer.load("t1").await.unwrap();
        let fresh = self::graph();
        fresh
            .restore(saved, Some(NodeKind::HumanApproval), true)
            .await;
        let mut outcome = fresh.resume().await.unwrap();
        while let RunOutcome::Paused(_) = outcome {
            outcome = fresh.resume().await.unwrap();
        }
        assert!(fresh.state_snapshot().await.values.is_complete);
    }
}
