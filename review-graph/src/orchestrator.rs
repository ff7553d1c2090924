//! Orchestrator planning layer: per-clause execution recipes and mid-run
//! adjustment.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use ai_llm_service::json_utils::parse_json_object;
use ai_llm_service::{ChatMessage, LlmClient};
use contract_model::{Priority, ReviewChecklistItem, Risk, RiskLevel};

use crate::prompts;

/// How deeply a clause is analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Quick,
    Standard,
    Deep,
}

impl Default for AnalysisDepth {
    fn default() -> Self {
        AnalysisDepth::Standard
    }
}

impl AnalysisDepth {
    fn parse(raw: &str) -> AnalysisDepth {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quick" => AnalysisDepth::Quick,
            "deep" => AnalysisDepth::Deep,
            _ => AnalysisDepth::Standard,
        }
    }

    /// Default iteration budget per depth.
    fn default_iterations(&self) -> u32 {
        match self {
            AnalysisDepth::Quick => 1,
            AnalysisDepth::Standard => 3,
            AnalysisDepth::Deep => 5,
        }
    }
}

/// Execution recipe for one clause.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClausePlan {
    pub clause_id: String,
    pub clause_name: String,
    pub analysis_depth: AnalysisDepth,
    pub suggested_tools: Vec<String>,
    pub max_iterations: u32,
    pub priority_order: i64,
    pub rationale: String,
    pub skip_diffs: bool,
    pub skip_validate: bool,
}

/// The full review plan; `plan_version` bumps on every applied adjustment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPlan {
    pub clause_plans: Vec<ClausePlan>,
    pub global_strategy: String,
    pub estimated_depth_distribution: Map<String, Value>,
    pub plan_version: u32,
}

impl ReviewPlan {
    pub fn plan_for(&self, clause_id: &str) -> Option<&ClausePlan> {
        self.clause_plans.iter().find(|cp| cp.clause_id == clause_id)
    }
}

/// Outcome of the mid-run dispatcher check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanAdjustment {
    pub should_adjust: bool,
    pub reason: String,
    pub adjusted_clauses: Vec<ClausePlan>,
}

fn clamp_iterations(depth: AnalysisDepth, raw: i64) -> u32 {
    if raw <= 0 {
        depth.default_iterations()
    } else {
        (raw as u32).clamp(1, 8)
    }
}

fn map_str(row: &Map<String, Value>, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn map_i64(row: &Map<String, Value>, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn map_string_list(row: &Map<String, Value>, key: &str) -> Vec<String> {
    row.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic plan used when the planner LLM is unavailable or fails:
/// critical clauses get a deep pass, everything else standard; order follows
/// the checklist.
pub fn build_default_plan(checklist: &[ReviewChecklistItem]) -> ReviewPlan {
    let clause_plans: Vec<ClausePlan> = checklist
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.clause_id.is_empty())
        .map(|(i, item)| {
            let depth = if item.priority == Priority::Critical {
                AnalysisDepth::Deep
            } else {
                AnalysisDepth::Standard
            };
            ClausePlan {
                clause_id: item.clause_id.clone(),
                clause_name: item.clause_name.clone(),
                analysis_depth: depth,
                suggested_tools: item.required_skills.clone(),
                max_iterations: depth.default_iterations(),
                priority_order: i as i64,
                rationale: format!("default plan: priority={:?}", item.priority),
                skip_diffs: false,
                skip_validate: false,
            }
        })
        .collect();

    let standard = clause_plans
        .iter()
        .filter(|cp| cp.analysis_depth == AnalysisDepth::Standard)
        .count();
    let deep = clause_plans
        .iter()
        .filter(|cp| cp.analysis_depth == AnalysisDepth::Deep)
        .count();
    let mut distribution = Map::new();
    distribution.insert("quick".to_string(), Value::from(0));
    distribution.insert("standard".to_string(), Value::from(standard));
    distribution.insert("deep".to_string(), Value::from(deep));

    ReviewPlan {
        clause_plans,
        global_strategy: "default plan: checklist order, deep passes on critical clauses"
            .to_string(),
        estimated_depth_distribution: distribution,
        plan_version: 1,
    }
}

fn clause_plan_from_row(row: &Map<String, Value>) -> Option<ClausePlan> {
    let clause_id = map_str(row, "clause_id");
    if clause_id.is_empty() {
        return None;
    }
    let depth = AnalysisDepth::parse(&map_str(row, "analysis_depth"));
    let quick = depth == AnalysisDepth::Quick;
    Some(ClausePlan {
        clause_id,
        clause_name: map_str(row, "clause_name"),
        analysis_depth: depth,
        suggested_tools: map_string_list(row, "suggested_tools"),
        max_iterations: clamp_iterations(depth, map_i64(row, "max_iterations")),
        priority_order: map_i64(row, "priority_order"),
        rationale: map_str(row, "rationale"),
        skip_diffs: row
            .get("skip_diffs")
            .and_then(Value::as_bool)
            .unwrap_or(quick),
        skip_validate: row
            .get("skip_validate")
            .and_then(Value::as_bool)
            .unwrap_or(quick),
    })
}

/// Asks the LLM for a per-clause plan, sanitizes it, back-fills checklist
/// entries the model skipped, and sorts by `priority_order`. Any failure
/// falls back to [`build_default_plan`].
pub async fn generate_review_plan(
    llm: &LlmClient,
    checklist: &[ReviewChecklistItem],
    domain_id: &str,
    material_type: &str,
    available_tools: &[String],
) -> ReviewPlan {
    let messages = prompts::build_planner_messages(checklist, domain_id, material_type, available_tools);

    let data = match llm.chat(&messages, Some(0.1)).await {
        Ok(response) => parse_json_object(&response),
        Err(err) => {
            warn!(%err, "planner LLM call failed, using default plan");
            return build_default_plan(checklist);
        }
    };
    if data.is_empty() {
        return build_default_plan(checklist);
    }

    let mut clause_plans: Vec<ClausePlan> = data
        .get("clause_plans")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_object)
                .filter_map(clause_plan_from_row)
                .collect()
        })
        .unwrap_or_default();

    // Back-fill checklist entries the model skipped.
    for item in checklist {
        if item.clause_id.is_empty()
            || clause_plans.iter().any(|cp| cp.clause_id == item.clause_id)
        {
            continue;
        }
        clause_plans.push(ClausePlan {
            clause_id: item.clause_id.clone(),
            clause_name: item.clause_name.clone(),
            analysis_depth: AnalysisDepth::Standard,
            suggested_tools: item.required_skills.clone(),
            max_iterations: 3,
            priority_order: clause_plans.len() as i64,
            rationale: "back-filled checklist entry missing from planner output".to_string(),
            skip_diffs: false,
            skip_validate: false,
        });
    }

    clause_plans.sort_by_key(|cp| cp.priority_order);
    debug!(clauses = clause_plans.len(), "review plan generated");

    ReviewPlan {
        clause_plans,
        global_strategy: map_str(&data, "global_strategy"),
        estimated_depth_distribution: data
            .get("estimated_depth_distribution")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        plan_version: data
            .get("plan_version")
            .and_then(Value::as_u64)
            .map(|v| v.max(1) as u32)
            .unwrap_or(1),
    }
}

/// Decides whether the remaining plan should change. Issues **zero** LLM
/// calls unless a trigger holds: a high-severity risk on the current clause,
/// or the midpoint heuristic (`total > 4` and progress at ⌊total/2⌋ or
/// ⌈total/2⌉).
pub async fn maybe_adjust_plan(
    llm: &LlmClient,
    current_clause_id: &str,
    current_risks: &[Risk],
    remaining_plan: &[ClausePlan],
    completed_count: usize,
    total_count: usize,
) -> PlanAdjustment {
    let has_high_risk = current_risks.iter().any(|r| r.risk_level == RiskLevel::High);
    let midpoint_floor = total_count / 2;
    let midpoint_ceil = total_count.div_ceil(2);
    let is_midpoint =
        total_count > 4 && (completed_count == midpoint_floor || completed_count == midpoint_ceil);

    if !has_high_risk && !is_midpoint {
        return PlanAdjustment {
            should_adjust: false,
            reason: "no trigger".to_string(),
            adjusted_clauses: Vec::new(),
        };
    }

    let messages = prompts::build_adjustment_messages(
        current_clause_id,
        current_risks,
        remaining_plan,
        completed_count,
        total_count,
    );

    let data = match llm.chat(&messages, Some(0.1)).await {
        Ok(response) => parse_json_object(&response),
        Err(err) => {
            warn!(%err, "plan adjustment LLM call failed");
            return PlanAdjustment {
                should_adjust: false,
                reason: format!("dispatch error: {err}"),
                adjusted_clauses: Vec::new(),
            };
        }
    };

    if !data.get("should_adjust").and_then(Value::as_bool).unwrap_or(false) {
        return PlanAdjustment {
            should_adjust: false,
            reason: map_str(&data, "reason"),
            adjusted_clauses: Vec::new(),
        };
    }

    let adjusted = data
        .get("adjusted_clauses")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_object)
                .filter_map(clause_plan_from_row)
                .collect()
        })
        .unwrap_or_default();

    PlanAdjustment {
        should_adjust: true,
        reason: map_str(&data, "reason"),
        adjusted_clauses: adjusted,
    }
}

/// Merges an adjustment into the plan. For every adjusted clause present in
/// the plan: depth, iteration budget, suggested tools (if provided) and
/// rationale are replaced, and the skip flags are re-derived from the depth.
/// The version bumps by exactly one.
pub fn apply_adjustment(plan: &ReviewPlan, adjustment: &PlanAdjustment) -> ReviewPlan {
    if !adjustment.should_adjust || adjustment.adjusted_clauses.is_empty() {
        return plan.clone();
    }

    let clause_plans = plan
        .clause_plans
        .iter()
        .map(|cp| {
            let Some(adj) = adjustment
                .adjusted_clauses
                .iter()
                .find(|a| a.clause_id == cp.clause_id)
            else {
                return cp.clone();
            };
            let depth = adj.analysis_depth;
            let quick = depth == AnalysisDepth::Quick;
            ClausePlan {
                clause_id: cp.clause_id.clone(),
                clause_name: cp.clause_name.clone(),
                analysis_depth: depth,
                suggested_tools: if adj.suggested_tools.is_empty() {
                    cp.suggested_tools.clone()
                } else {
                    adj.suggested_tools.clone()
                },
                max_iterations: clamp_iterations(depth, adj.max_iterations as i64),
                priority_order: cp.priority_order,
                rationale: if adj.rationale.is_empty() {
                    cp.rationale.clone()
                } else {
                    adj.rationale.clone()
                },
                skip_diffs: quick,
                skip_validate: quick,
            }
        })
        .collect();

    ReviewPlan {
        clause_plans,
        global_strategy: plan.global_strategy.clone(),
        estimated_depth_distribution: plan.estimated_depth_distribution.clone(),
        plan_version: plan.plan_version + 1,
    }
}
