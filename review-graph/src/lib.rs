//! Review graph engine.
//!
//! The engine walks each checklist clause through a fixed node pipeline:
//!
//! ```text
//! init → parse_document → [plan_review] → clause_analyze
//!     → clause_generate_diffs → clause_validate → human_approval
//!     → save_clause → (next clause | summarize)
//! ```
//!
//! Nodes are pure-ish functions from state to a partial update; only the
//! engine merges updates, checkpoints state after every node, and evaluates
//! conditional edges. `human_approval` is an interrupt point: the run pauses
//! there with the proposed diffs exposed, and continues on an explicit
//! resume after the user's decisions were merged in.
//!
//! Inside `clause_analyze`, a ReAct tool loop drives the skill dispatcher
//! under a per-clause wall-clock budget; every LLM failure degrades to a
//! deterministic path so a review always runs to completion.

pub mod engine;
pub mod errors;
pub mod nodes;
pub mod orchestrator;
pub mod prompts;
pub mod react;
pub mod settings;
pub mod state;

pub use engine::{Checkpointer, GraphContext, NodeKind, ReviewGraph, RunOutcome, StateSnapshot};
pub use errors::{GraphError, GraphResult};
pub use orchestrator::{AnalysisDepth, ClausePlan, PlanAdjustment, ReviewPlan};
pub use settings::{ExecutionMode, GraphSettings};
pub use state::{DocumentRole, GraphState, StateUpdate, TaskDocument, ValidationResult};
