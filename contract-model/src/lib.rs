//! Shared contract document model.
//!
//! This crate owns the data shapes every other crate works against:
//!
//! - the parsed **clause tree** (`DocumentStructure`, `ClauseNode`) with
//!   definitions and cross references,
//! - the **review artifacts** produced by the pipeline (`Risk`, `Diff`,
//!   `Action`, `ClauseFindings`) and the checklist driving it,
//! - the regex-based **structure parser** that turns raw contract text into a
//!   clause tree,
//! - the process-wide **domain plugin registry** (checklists, baseline texts
//!   and parser configs supplied per contract domain).
//!
//! The crate is deliberately I/O free: parsing is pure, the registry is an
//! in-process map, and everything serializes with `serde` so the graph state
//! can be checkpointed as JSON.

pub mod document;
pub mod errors;
pub mod parser;
pub mod patterns;
pub mod plugin;
pub mod review;

pub use document::{
    ClauseNode, CrossReference, DefinitionEntry, DocumentParserConfig, DocumentStructure,
    ReferenceSource,
};
pub use errors::{ModelError, ModelResult};
pub use parser::StructureParser;
pub use plugin::DomainPlugin;
pub use review::{
    Action, ClauseFindings, Diff, DiffAction, DiffStatus, Priority, ReviewChecklistItem, Risk,
    RiskLevel, RiskLocation, generate_id,
};
