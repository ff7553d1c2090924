//! Node implementations and conditional routers.
//!
//! Every node is a function from `&GraphState` (plus the shared context) to
//! a partial [`StateUpdate`]; nodes never mutate state themselves. LLM
//! failures inside a node degrade to a deterministic result — the graph
//! always reaches `summarize`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use ai_llm_service::json_utils::{parse_json_array, parse_json_object};
use contract_model::{
    ClauseFindings, Diff, DiffAction, DiffStatus, Priority, ReviewChecklistItem, Risk, RiskLevel,
    RiskLocation, generate_id,
};

use crate::engine::{GraphContext, NodeKind};
use crate::orchestrator::{self, ClausePlan};
use crate::prompts;
use crate::react::{ReactOutcome, react_agent_loop};
use crate::settings::ExecutionMode;
use crate::state::{DocumentRole, GraphState, StateUpdate, ValidationResult};

/// Seeds empty collections and resets control counters.
pub(crate) fn node_init(state: &GraphState) -> StateUpdate {
    StateUpdate {
        current_clause_index: Some(0),
        findings: Some(BTreeMap::new()),
        global_issues: Some(Vec::new()),
        all_risks: Some(Vec::new()),
        all_diffs: Some(Vec::new()),
        all_actions: Some(Vec::new()),
        clause_retry_count: Some(0),
        max_retries: Some(if state.max_retries == 0 { 2 } else { state.max_retries }),
        plan_version: Some(state.plan_version.max(1)),
        is_complete: Some(false),
        error: Some(None),
        ..Default::default()
    }
}

/// Pulls the primary structured document into `primary_structure` and
/// generates a generic checklist when none was supplied.
pub(crate) fn node_parse_document(state: &GraphState) -> StateUpdate {
    let mut primary_structure = state.primary_structure.clone();
    if primary_structure.is_none() {
        primary_structure = state
            .documents
            .iter()
            .find(|d| d.role == DocumentRole::Primary)
            .and_then(|d| d.structure.clone());
    }

    let checklist = if state.review_checklist.is_empty() {
        match &primary_structure {
            Some(structure) => generate_generic_checklist(structure),
            None => Vec::new(),
        }
    } else {
        state.review_checklist.clone()
    };

    debug!(
        task_id = %state.task_id,
        checklist = checklist.len(),
        has_structure = primary_structure.is_some(),
        "document parsed into review inputs"
    );
    StateUpdate {
        primary_structure: Some(primary_structure),
        review_checklist: Some(checklist),
        ..Default::default()
    }
}

/// One checklist item per top-level clause: medium priority, clause-context
/// skill only.
fn generate_generic_checklist(
    structure: &contract_model::DocumentStructure,
) -> Vec<ReviewChecklistItem> {
    structure
        .clauses
        .iter()
        .map(|clause| ReviewChecklistItem {
            clause_id: clause.clause_id.clone(),
            clause_name: clause.title.clone(),
            priority: Priority::Medium,
            required_skills: vec!["get_clause_context".to_string()],
            description: format!("Review clause {}", clause.clause_id),
        })
        .collect()
}

/// Produces (or refreshes) the review plan and reorders the checklist to the
/// planner's `priority_order`.
pub(crate) async fn node_plan_review(state: &GraphState, ctx: &GraphContext) -> StateUpdate {
    if state.review_checklist.is_empty() {
        return StateUpdate {
            review_plan: Some(Some(orchestrator::ReviewPlan {
                plan_version: 1,
                ..Default::default()
            })),
            plan_version: Some(1),
            ..Default::default()
        };
    }

    let tool_names: Vec<String> = ctx
        .dispatcher
        .as_ref()
        .map(|d| {
            d.tool_definitions(state.domain_id.as_deref())
                .into_iter()
                .map(|t| t.function.name)
                .collect()
        })
        .unwrap_or_default();

    let plan = match &ctx.llm {
        Some(llm) => {
            orchestrator::generate_review_plan(
                llm,
                &state.review_checklist,
                state.domain_id.as_deref().unwrap_or(""),
                &state.material_type,
                &tool_names,
            )
            .await
        }
        None => orchestrator::build_default_plan(&state.review_checklist),
    };

    // Reorder the checklist to match the plan; unplanned items keep their
    // relative order at the tail.
    let ordered_ids: Vec<&str> = plan
        .clause_plans
        .iter()
        .filter(|cp| !cp.clause_id.is_empty())
        .map(|cp| cp.clause_id.as_str())
        .collect();
    let mut reordered: Vec<ReviewChecklistItem> = ordered_ids
        .iter()
        .filter_map(|cid| state.review_checklist.iter().find(|i| i.clause_id == *cid))
        .cloned()
        .collect();
    for item in &state.review_checklist {
        if !ordered_ids.contains(&item.clause_id.as_str()) {
            reordered.push(item.clone());
        }
    }

    StateUpdate {
        plan_version: Some(plan.plan_version.max(1)),
        review_plan: Some(Some(plan)),
        review_checklist: Some(reordered),
        ..Default::default()
    }
}

fn clause_plan_for<'a>(state: &'a GraphState, clause_id: &str) -> Option<&'a ClausePlan> {
    state.review_plan.as_ref()?.plan_for(clause_id)
}

/// Assigns fresh ids and coerced levels to raw LLM risk rows.
fn normalize_risks(raw_rows: Vec<Map<String, Value>>) -> Vec<Risk> {
    raw_rows
        .into_iter()
        .map(|row| {
            let original_text = row
                .get("original_text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Risk {
                id: generate_id("risk"),
                risk_level: RiskLevel::coerce(
                    row.get("risk_level").and_then(Value::as_str).unwrap_or(""),
                ),
                risk_type: row
                    .get("risk_type")
                    .and_then(Value::as_str)
                    .unwrap_or("uncategorized risk")
                    .to_string(),
                description: str_field(&row, "description"),
                reason: str_field(&row, "reason"),
                analysis: str_field(&row, "analysis"),
                location: if original_text.is_empty() {
                    None
                } else {
                    Some(RiskLocation {
                        original_text: original_text.to_string(),
                    })
                },
            }
        })
        .collect()
}

fn str_field(row: &Map<String, Value>, key: &str) -> String {
    row.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Clause text for downstream nodes: the clause-context skill output when
/// available, else a structure lookup, else the checklist description.
fn resolve_clause_text(
    state: &GraphState,
    skill_context: &BTreeMap<String, Value>,
    clause_id: &str,
    clause_name: &str,
    description: &str,
) -> String {
    let from_skill = skill_context
        .get("get_clause_context")
        .and_then(|c| c.get("context_text"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !from_skill.is_empty() {
        return from_skill.to_string();
    }
    if let Some(structure) = &state.primary_structure {
        let text = structure.clause_text(clause_id);
        if !text.is_empty() {
            return text;
        }
    }
    let fallback = format!("{clause_name}\n{description}");
    let fallback = fallback.trim();
    if fallback.is_empty() {
        clause_id.to_string()
    } else {
        fallback.to_string()
    }
}

/// Runs each candidate skill exactly once through the dispatcher and
/// collects the successful outputs. Risks stay empty on this path.
async fn deterministic_fallback(
    state: &GraphState,
    ctx: &GraphContext,
    clause_id: &str,
    skills: &[String],
) -> BTreeMap<String, Value> {
    let mut skill_context = BTreeMap::new();
    let (Some(dispatcher), Some(structure)) = (&ctx.dispatcher, &state.primary_structure) else {
        return skill_context;
    };
    let snapshot = state.skill_snapshot();
    for skill_id in skills {
        if !dispatcher.contains(skill_id) {
            debug!(skill_id, "skill not registered, skipping");
            continue;
        }
        match dispatcher
            .prepare_and_call(skill_id, clause_id, structure, &snapshot, None)
            .await
        {
            Ok(result) if result.success => {
                if let Some(data) = result.data {
                    skill_context.insert(skill_id.clone(), data);
                }
            }
            Ok(result) => {
                warn!(skill_id, error = result.error.as_deref().unwrap_or(""), "skill call failed");
            }
            Err(err) => {
                warn!(skill_id, %err, "skill call raised");
            }
        }
    }
    skill_context
}

struct ClauseItem {
    clause_id: String,
    clause_name: String,
    description: String,
    priority: String,
    required_skills: Vec<String>,
}

fn current_item(state: &GraphState) -> Option<ClauseItem> {
    let item = state.review_checklist.get(state.current_clause_index)?;
    Some(ClauseItem {
        clause_id: item.clause_id.clone(),
        clause_name: item.clause_name.clone(),
        description: item.description.clone(),
        priority: serde_json::to_value(item.priority)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "medium".to_string()),
        required_skills: item.required_skills.clone(),
    })
}

/// ReAct (gen3), legacy single-chat, or deterministic analysis of the
/// current clause, per configuration and available collaborators.
pub(crate) async fn node_clause_analyze(state: &GraphState, ctx: &GraphContext) -> StateUpdate {
    let Some(item) = current_item(state) else {
        return StateUpdate::default();
    };
    let suggested_skills = clause_plan_for(state, &item.clause_id)
        .filter(|plan| !plan.suggested_tools.is_empty())
        .map(|plan| plan.suggested_tools.clone())
        .unwrap_or_else(|| item.required_skills.clone());
    let max_iterations = clause_plan_for(state, &item.clause_id)
        .map(|plan| plan.max_iterations)
        .unwrap_or(ctx.settings.react_max_iterations);

    if ctx.settings.mode == ExecutionMode::Gen3
        && ctx.llm.is_some()
        && ctx.dispatcher.is_some()
        && state.primary_structure.is_some()
    {
        let branch = run_react_branch(state, ctx, &item, &suggested_skills, max_iterations);
        match tokio::time::timeout(ctx.settings.react_clause_timeout, branch).await {
            Ok(outcome) if !outcome.skill_context.is_empty() => {
                return finish_analyze(state, &item, outcome);
            }
            Ok(_) => {
                warn!(clause_id = %item.clause_id, "ReAct branch produced no skill context, falling back");
            }
            Err(_) => {
                warn!(
                    clause_id = %item.clause_id,
                    timeout_ms = ctx.settings.react_clause_timeout.as_millis() as u64,
                    "ReAct branch timed out, falling back"
                );
            }
        }
    }

    if ctx.settings.mode == ExecutionMode::Legacy && ctx.llm.is_some() {
        return legacy_analyze(state, ctx, &item).await;
    }

    // Deterministic path: skills only, no risks.
    let skill_context = deterministic_fallback(state, ctx, &item.clause_id, &suggested_skills).await;
    let clause_text = resolve_clause_text(
        state,
        &skill_context,
        &item.clause_id,
        &item.clause_name,
        &item.description,
    );
    StateUpdate {
        current_clause_id: Some(item.clause_id),
        current_clause_text: Some(clause_text),
        current_risks: Some(Vec::new()),
        current_diffs: Some(Vec::new()),
        current_skill_context: Some(skill_context),
        agent_messages: Some(Vec::new()),
        clause_retry_count: Some(0),
        ..Default::default()
    }
}

async fn run_react_branch(
    state: &GraphState,
    ctx: &GraphContext,
    item: &ClauseItem,
    suggested_skills: &[String],
    max_iterations: u32,
) -> ReactOutcome {
    // Presence checked by the caller.
    let (Some(llm), Some(dispatcher), Some(structure)) =
        (&ctx.llm, &ctx.dispatcher, &state.primary_structure)
    else {
        return ReactOutcome::default();
    };

    let clause_text = {
        let text = structure.clause_text(&item.clause_id);
        if text.is_empty() {
            let fallback = format!("{}\n{}", item.clause_name, item.description);
            let fallback = fallback.trim().to_string();
            if fallback.is_empty() { item.clause_id.clone() } else { fallback }
        } else {
            text
        }
    };

    let messages = prompts::build_react_agent_messages(
        &state.language,
        &state.our_party,
        &item.clause_id,
        &item.clause_name,
        &item.description,
        &item.priority,
        &clause_text,
        suggested_skills,
    );

    react_agent_loop(
        llm,
        dispatcher,
        messages,
        &item.clause_id,
        structure,
        &state.skill_snapshot(),
        state.domain_id.as_deref(),
        max_iterations,
        ctx.settings.react_temperature,
    )
    .await
}

fn finish_analyze(state: &GraphState, item: &ClauseItem, outcome: ReactOutcome) -> StateUpdate {
    let clause_text = resolve_clause_text(
        state,
        &outcome.skill_context,
        &item.clause_id,
        &item.clause_name,
        &item.description,
    );
    StateUpdate {
        current_clause_id: Some(item.clause_id.clone()),
        current_clause_text: Some(clause_text),
        current_risks: Some(normalize_risks(outcome.raw_risks)),
        current_diffs: Some(Vec::new()),
        current_skill_context: Some(outcome.skill_context),
        agent_messages: Some(outcome.messages),
        clause_retry_count: Some(0),
        ..Default::default()
    }
}

/// Legacy mode: required skills once each, then a single analysis chat.
async fn legacy_analyze(state: &GraphState, ctx: &GraphContext, item: &ClauseItem) -> StateUpdate {
    let skill_context =
        deterministic_fallback(state, ctx, &item.clause_id, &item.required_skills).await;
    let clause_text = resolve_clause_text(
        state,
        &skill_context,
        &item.clause_id,
        &item.clause_name,
        &item.description,
    );

    let mut risks = Vec::new();
    if let Some(llm) = &ctx.llm {
        let messages = prompts::build_clause_analyze_messages(
            &state.language,
            &state.our_party,
            &item.clause_id,
            &item.clause_name,
            &item.description,
            &item.priority,
            &clause_text,
            &skill_context,
        );
        match llm.chat(&messages, None).await {
            Ok(response) => risks = normalize_risks(parse_json_array(&response)),
            Err(err) => {
                warn!(clause_id = %item.clause_id, %err, "clause analysis LLM call failed, empty risk fallback");
            }
        }
    }

    StateUpdate {
        current_clause_id: Some(item.clause_id.clone()),
        current_clause_text: Some(clause_text),
        current_risks: Some(risks),
        current_diffs: Some(Vec::new()),
        current_skill_context: Some(skill_context),
        agent_messages: Some(Vec::new()),
        clause_retry_count: Some(0),
        ..Default::default()
    }
}

/// Turns the clause's risks into proposed diffs via one LLM call.
pub(crate) async fn node_clause_generate_diffs(
    state: &GraphState,
    ctx: &GraphContext,
) -> StateUpdate {
    if state.current_risks.is_empty() {
        return StateUpdate {
            current_diffs: Some(Vec::new()),
            ..Default::default()
        };
    }

    let mut diffs = Vec::new();
    if let Some(llm) = &ctx.llm {
        let messages = prompts::build_clause_generate_diffs_messages(
            &state.current_clause_id,
            &state.current_clause_text,
            &state.current_risks,
        );
        match llm.chat(&messages, None).await {
            Ok(response) => {
                for row in parse_json_array(&response) {
                    diffs.push(diff_from_row(state, &row));
                }
            }
            Err(err) => {
                warn!(clause_id = %state.current_clause_id, %err, "diff generation LLM call failed, empty diff fallback");
            }
        }
    }

    StateUpdate {
        current_diffs: Some(diffs),
        ..Default::default()
    }
}

fn diff_from_row(state: &GraphState, row: &Map<String, Value>) -> Diff {
    // The model addresses risks by index; map back to real ids.
    let risk_id = row
        .get("risk_id")
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        })
        .and_then(|idx| state.current_risks.get(idx))
        .or_else(|| state.current_risks.first())
        .map(|risk| risk.id.clone());

    let original_text = str_field(row, "original_text");
    let mut metadata = BTreeMap::new();
    if !original_text.is_empty() {
        metadata.insert(
            "text_match".to_string(),
            Value::Bool(
                state.current_clause_text.is_empty()
                    || state.current_clause_text.contains(&original_text),
            ),
        );
    }

    Diff {
        diff_id: generate_id("diff"),
        risk_id,
        clause_id: state.current_clause_id.clone(),
        action_type: DiffAction::coerce(row.get("action_type").and_then(Value::as_str).unwrap_or("")),
        original_text,
        proposed_text: str_field(row, "proposed_text"),
        status: DiffStatus::Pending,
        reason: str_field(row, "reason"),
        risk_level: RiskLevel::coerce(row.get("risk_level").and_then(Value::as_str).unwrap_or("")),
        metadata,
    }
}

/// Quality gate over the clause's risks and diffs. Fail increments the retry
/// counter; any LLM trouble passes the clause through.
pub(crate) async fn node_clause_validate(state: &GraphState, ctx: &GraphContext) -> StateUpdate {
    let retry_count = state.clause_retry_count;
    if state.current_risks.is_empty() && state.current_diffs.is_empty() {
        return StateUpdate {
            validation_result: Some(ValidationResult::Pass),
            clause_retry_count: Some(retry_count),
            ..Default::default()
        };
    }

    let mut result = ValidationResult::Pass;
    if let Some(llm) = &ctx.llm {
        let messages = prompts::build_clause_validate_messages(
            &state.current_clause_id,
            &state.current_clause_text,
            &state.current_risks,
            &state.current_diffs,
        );
        match llm.chat(&messages, None).await {
            Ok(response) => {
                let parsed = parse_json_object(&response);
                if parsed.get("result").and_then(Value::as_str) == Some("fail") {
                    result = ValidationResult::Fail;
                }
            }
            Err(err) => {
                warn!(clause_id = %state.current_clause_id, %err, "validation LLM call failed, passing clause through");
            }
        }
    }

    StateUpdate {
        validation_result: Some(result),
        clause_retry_count: Some(if result == ValidationResult::Fail {
            retry_count + 1
        } else {
            retry_count
        }),
        ..Default::default()
    }
}

/// Exposes the clause's diffs for approval. The engine pauses right after
/// this node runs.
pub(crate) fn node_human_approval(state: &GraphState) -> StateUpdate {
    StateUpdate {
        pending_diffs: Some(state.current_diffs.clone()),
        ..Default::default()
    }
}

/// Commits the clause's findings, advances the index, clears the pending
/// window, and (gen3) may adjust the remaining plan.
pub(crate) async fn node_save_clause(state: &GraphState, ctx: &GraphContext) -> StateUpdate {
    let clause_id = state.current_clause_id.clone();

    let approved_diffs: Vec<Diff> = state
        .current_diffs
        .iter()
        .filter(|diff| {
            state
                .user_decisions
                .get(&diff.diff_id)
                .map(|decision| decision == "approve")
                .unwrap_or(true)
        })
        .map(|diff| {
            let mut approved = diff.clone();
            approved.status = DiffStatus::Approved;
            approved
        })
        .collect();

    let mut findings = state.findings.clone();
    findings.insert(
        clause_id.clone(),
        ClauseFindings {
            clause_id: clause_id.clone(),
            risks: state.current_risks.clone(),
            diffs: approved_diffs.clone(),
            skill_context: state.current_skill_context.clone(),
            completed: true,
        },
    );

    let mut all_risks = state.all_risks.clone();
    all_risks.extend(state.current_risks.iter().cloned());
    let mut all_diffs = state.all_diffs.clone();
    all_diffs.extend(approved_diffs);

    let completed_count = state.current_clause_index + 1;
    let mut update = StateUpdate {
        findings: Some(findings.clone()),
        all_risks: Some(all_risks),
        all_diffs: Some(all_diffs),
        current_clause_index: Some(completed_count),
        pending_diffs: Some(Vec::new()),
        ..Default::default()
    };

    if ctx.settings.mode == ExecutionMode::Gen3 {
        if let (Some(llm), Some(plan)) = (&ctx.llm, &state.review_plan) {
            let remaining: Vec<ClausePlan> = plan
                .clause_plans
                .iter()
                .filter(|cp| !cp.clause_id.is_empty() && !findings.contains_key(&cp.clause_id))
                .cloned()
                .collect();
            let adjustment = orchestrator::maybe_adjust_plan(
                llm,
                &clause_id,
                &state.current_risks,
                &remaining,
                completed_count,
                state.review_checklist.len(),
            )
            .await;
            if adjustment.should_adjust {
                let updated = orchestrator::apply_adjustment(plan, &adjustment);
                update.plan_version = Some(updated.plan_version);
                update.review_plan = Some(Some(updated));
            }
        }
    }

    update
}

fn fallback_summary(state: &GraphState) -> String {
    format!(
        "Reviewed {} clauses; found {} risks; produced {} diffs.",
        state.findings.len(),
        state.all_risks.len(),
        state.all_diffs.len(),
    )
}

/// Produces the closing summary and marks the run complete.
pub(crate) async fn node_summarize(state: &GraphState, ctx: &GraphContext) -> StateUpdate {
    let mut summary = fallback_summary(state);

    if let Some(llm) = &ctx.llm {
        let count = |level: RiskLevel| {
            state
                .all_risks
                .iter()
                .filter(|r| r.risk_level == level)
                .count()
        };
        let finding_lines: Vec<String> = state
            .findings
            .iter()
            .map(|(clause_id, f)| {
                format!(
                    "- clause {}: {} risks, {} edits",
                    clause_id,
                    f.risks.len(),
                    f.diffs.len()
                )
            })
            .collect();
        let findings_detail = if finding_lines.is_empty() {
            "none".to_string()
        } else {
            finding_lines.join("\n")
        };
        let messages = prompts::build_summarize_messages(
            state.review_checklist.len(),
            state.all_risks.len(),
            count(RiskLevel::High),
            count(RiskLevel::Medium),
            count(RiskLevel::Low),
            state.all_diffs.len(),
            &findings_detail,
        );
        match llm.chat(&messages, None).await {
            Ok(response) if !response.trim().is_empty() => summary = response.trim().to_string(),
            Ok(_) => {}
            Err(err) => {
                warn!(task_id = %state.task_id, %err, "summary LLM call failed, using fallback summary");
            }
        }
    }

    StateUpdate {
        summary_notes: Some(summary),
        is_complete: Some(true),
        ..Default::default()
    }
}

// ------------------------------ routers ------------------------------------

/// Next clause if any remain (and no error), else summarize.
pub fn route_next_clause_or_end(state: &GraphState) -> NodeKind {
    if state.error.is_some() {
        return NodeKind::Summarize;
    }
    if state.current_clause_index < state.review_checklist.len() {
        NodeKind::ClauseAnalyze
    } else {
        NodeKind::Summarize
    }
}

/// Gen3 only: plan-driven skip of diff generation.
pub fn route_after_analyze(state: &GraphState) -> NodeKind {
    if !state.current_clause_id.is_empty() {
        if let Some(plan) = clause_plan_for(state, &state.current_clause_id) {
            if plan.skip_diffs {
                return NodeKind::SaveClause;
            }
        }
    }
    NodeKind::ClauseGenerateDiffs
}

/// Pass → approval; fail within budget → regenerate; budget spent → save.
pub fn route_validation(state: &GraphState) -> NodeKind {
    match state.validation_result {
        Some(ValidationResult::Fail) => {
            if state.clause_retry_count < state.max_retries {
                NodeKind::ClauseGenerateDiffs
            } else {
                NodeKind::SaveClause
            }
        }
        _ => NodeKind::HumanApproval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::StructureParser;
    use pretty_assertions::assert_eq;

    fn base_state() -> GraphState {
        let structure = StructureParser::generic()
            .parse("14.1 Payment terms.\n14.2 Advance payment.\n17.6 Liability cap.\n", "doc");
        GraphState {
            task_id: "t1".to_string(),
            language: "en".to_string(),
            primary_structure: Some(structure),
            ..Default::default()
        }
    }

    #[test]
    fn init_seeds_counters_and_clears_error() {
        let mut state = base_state();
        state.error = Some("previous".to_string());
        state.apply(node_init(&state.clone()));
        assert_eq!(state.current_clause_index, 0);
        assert_eq!(state.max_retries, 2);
        assert_eq!(state.plan_version, 1);
        assert!(state.error.is_none());
        assert!(!state.is_complete);
    }

    #[test]
    fn parse_document_generates_generic_checklist() {
        let mut state = base_state();
        state.apply(node_parse_document(&state.clone()));
        assert_eq!(state.review_checklist.len(), 3);
        let item = &state.review_checklist[0];
        assert_eq!(item.clause_id, "14.1");
        assert_eq!(item.priority, Priority::Medium);
        assert_eq!(item.required_skills, vec!["get_clause_context"]);
    }

    #[test]
    fn parse_document_keeps_supplied_checklist() {
        let mut state = base_state();
        state.review_checklist = vec![ReviewChecklistItem {
            clause_id: "17.6".to_string(),
            ..Default::default()
        }];
        state.apply(node_parse_document(&state.clone()));
        assert_eq!(state.review_checklist.len(), 1);
    }

    #[test]
    fn normalize_risks_assigns_ids_and_coerces_levels() {
        let rows = parse_json_array(
            r#"[{"risk_level":"catastrophic","description":"d","original_text":"payment"}]"#,
        );
        let risks = normalize_risks(rows);
        assert_eq!(risks.len(), 1);
        assert!(risks[0].id.starts_with("risk_"));
        assert_eq!(risks[0].risk_level, RiskLevel::Medium);
        assert_eq!(risks[0].location.as_ref().unwrap().original_text, "payment");
    }

    #[test]
    fn clause_text_prefers_skill_context() {
        let state = base_state();
        let mut ctx = BTreeMap::new();
        ctx.insert(
            "get_clause_context".to_string(),
            serde_json::json!({"context_text": "from skill"}),
        );
        assert_eq!(resolve_clause_text(&state, &ctx, "14.2", "", ""), "from skill");
        assert!(
            resolve_clause_text(&state, &BTreeMap::new(), "14.2", "", "").contains("Advance")
        );
        assert_eq!(resolve_clause_text(&state, &BTreeMap::new(), "99", "", ""), "99");
    }

    #[test]
    fn human_approval_exposes_current_diffs() {
        let mut state = base_state();
        state.current_diffs = vec![Diff {
            diff_id: "diff_1".to_string(),
            clause_id: "14.2".to_string(),
            ..Default::default()
        }];
        let update = node_human_approval(&state);
        assert_eq!(update.pending_diffs.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_clause_honors_decisions_and_clears_pending() {
        let ctx = GraphContext::default();
        let mut state = base_state();
        state.current_clause_id = "14.2".to_string();
        state.current_diffs = vec![
            Diff {
                diff_id: "diff_a".to_string(),
                clause_id: "14.2".to_string(),
                ..Default::default()
            },
            Diff {
                diff_id: "diff_b".to_string(),
                clause_id: "14.2".to_string(),
                ..Default::default()
            },
        ];
        state.pending_diffs = state.current_diffs.clone();
        state
            .user_decisions
            .insert("diff_b".to_string(), "reject".to_string());

        state.apply(node_save_clause(&state.clone(), &ctx).await);

        let findings = state.findings.get("14.2").unwrap();
        assert_eq!(findings.diffs.len(), 1);
        assert_eq!(findings.diffs[0].diff_id, "diff_a");
        assert_eq!(findings.diffs[0].status, DiffStatus::Approved);
        assert!(findings.completed);
        assert_eq!(state.current_clause_index, 1);
        assert!(state.pending_diffs.is_empty());
        assert_eq!(state.all_diffs.len(), 1);
    }

    #[tokio::test]
    async fn summarize_without_llm_uses_deterministic_summary() {
        let ctx = GraphContext::default();
        let mut state = base_state();
        state.findings.insert("14.2".to_string(), ClauseFindings::default());
        state.apply(node_summarize(&state.clone(), &ctx).await);
        assert!(state.is_complete);
        assert_eq!(state.summary_notes, "Reviewed 1 clauses; found 0 risks; produced 0 diffs.");
    }

    #[test]
    fn routing_follows_retry_budget() {
        let mut state = base_state();
        state.max_retries = 2;
        state.validation_result = Some(ValidationResult::Fail);
        state.clause_retry_count = 1;
        assert_eq!(route_validation(&state), NodeKind::ClauseGenerateDiffs);
        state.clause_retry_count = 2;
        assert_eq!(route_validation(&state), NodeKind::SaveClause);
        state.validation_result = Some(ValidationResult::Pass);
        assert_eq!(route_validation(&state), NodeKind::HumanApproval);
    }

    #[test]
    fn routing_ends_on_error_or_exhausted_checklist() {
        let mut state = base_state();
        state.review_checklist = vec![ReviewChecklistItem::default()];
        state.current_clause_index = 0;
        assert_eq!(route_next_clause_or_end(&state), NodeKind::ClauseAnalyze);
        state.current_clause_index = 1;
        assert_eq!(route_next_clause_or_end(&state), NodeKind::Summarize);
        state.current_clause_index = 0;
        state.error = Some("boom".to_string());
        assert_eq!(route_next_clause_or_end(&state), NodeKind::Summarize);
    }

    #[test]
    fn analyze_route_skips_diffs_when_plan_says_so() {
        let mut state = base_state();
        state.current_clause_id = "14.2".to_string();
        state.review_plan = Some(crate::orchestrator::ReviewPlan {
            clause_plans: vec![ClausePlan {
                clause_id: "14.2".to_string(),
                skip_diffs: true,
                ..Default::default()
            }],
            ..Default::default()
        });
        assert_eq!(route_after_analyze(&state), NodeKind::SaveClause);
        state.review_plan = None;
        assert_eq!(route_after_analyze(&state), NodeKind::ClauseGenerateDiffs);
    }
}
