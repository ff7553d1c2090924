//! Skill registry and dispatcher.
//!
//! A *skill* is a deterministic analytical handler exposed to the LLM as a
//! callable tool. This crate owns:
//!
//! - the registration schema (`SkillRegistration`, `SkillResult`) and the
//!   projection of typed input schemas into LLM-facing tool definitions
//!   (internal orchestrator fields stripped),
//! - the dispatcher that prepares inputs from orchestrator state, merges
//!   LLM-provided arguments over the non-internal fields, executes local or
//!   remote handlers, and records execution time,
//! - the built-in generic skills (clause context, definitions, baseline
//!   comparison, cross references, financial terms, review criteria,
//!   deviation assessment, reference-document search),
//! - a minimal remote workflow client (submit + poll).
//!
//! Handlers are enum-dispatched; there are no trait objects. Concurrency is
//! the caller's concern: the ReAct loop joins `prepare_and_call` futures so
//! one slow or failing tool never blocks or cancels its siblings.

pub mod builtin;
pub mod dispatcher;
pub mod errors;
pub mod local;
pub mod remote;
pub mod schema;
pub mod tool_adapter;

pub use builtin::generic_skills;
pub use dispatcher::{SkillDeps, SkillDispatcher};
pub use errors::{SkillError, SkillResult as SkillCallResult};
pub use remote::{WorkflowClient, WorkflowClientConfig};
pub use schema::{
    INTERNAL_FIELDS, SkillBackend, SkillRegistration, SkillResult, SkillStatus,
    strip_internal_fields,
};
pub use tool_adapter::{ParsedToolCall, parse_tool_calls, skills_to_tool_definitions};
