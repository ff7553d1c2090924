//! Built-in local skill handlers.
//!
//! Each skill lives in its own module with a typed input/output pair, a pure
//! `prepare_input` constructor building the default input from orchestrator
//! state, and the handler itself. Dispatch is a closed enum.

pub mod assess_deviation;
pub mod clause_context;
pub mod compare_with_baseline;
pub mod cross_reference_check;
pub mod extract_financial_terms;
pub mod load_review_criteria;
pub mod resolve_definition;
pub mod semantic_search;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use contract_model::DocumentStructure;

use crate::dispatcher::SkillDeps;
use crate::errors::SkillError;

/// Closed set of executable handlers.
#[derive(Debug, Clone)]
pub enum SkillHandler {
    ClauseContext,
    ResolveDefinition,
    CompareWithBaseline,
    CrossReferenceCheck,
    ExtractFinancialTerms,
    LoadReviewCriteria,
    AssessDeviation,
    SearchReferenceDoc,
    /// Remote workflow executed through the configured workflow client.
    Remote { workflow_id: String },
}

impl SkillHandler {
    /// Builds the default typed input for this handler from orchestrator
    /// state. The LLM's own arguments are merged over this later, for the
    /// non-internal fields only.
    pub fn prepare_input(
        &self,
        clause_id: &str,
        primary_structure: &DocumentStructure,
        state_snapshot: &Value,
    ) -> Result<Value, SkillError> {
        match self {
            SkillHandler::ClauseContext => {
                to_value(clause_context::prepare_input(clause_id, primary_structure))
            }
            SkillHandler::ResolveDefinition => {
                to_value(resolve_definition::prepare_input(clause_id, primary_structure))
            }
            SkillHandler::CompareWithBaseline => to_value(compare_with_baseline::prepare_input(
                clause_id,
                primary_structure,
                state_snapshot,
            )),
            SkillHandler::CrossReferenceCheck => {
                to_value(cross_reference_check::prepare_input(clause_id, primary_structure))
            }
            SkillHandler::ExtractFinancialTerms => {
                to_value(extract_financial_terms::prepare_input(clause_id, primary_structure))
            }
            SkillHandler::LoadReviewCriteria => to_value(load_review_criteria::prepare_input(
                clause_id,
                primary_structure,
                state_snapshot,
            )),
            SkillHandler::AssessDeviation => to_value(assess_deviation::prepare_input(
                clause_id,
                primary_structure,
                state_snapshot,
            )),
            SkillHandler::SearchReferenceDoc => to_value(semantic_search::prepare_input(
                clause_id,
                primary_structure,
                state_snapshot,
            )),
            // No default shape for remote workflows beyond the clause id.
            SkillHandler::Remote { .. } => Ok(serde_json::json!({ "clause_id": clause_id })),
        }
    }

    /// Executes the handler on an already-prepared input value.
    pub async fn execute(
        &self,
        skill_id: &str,
        input: Value,
        deps: &SkillDeps,
    ) -> Result<Value, SkillError> {
        match self {
            SkillHandler::ClauseContext => {
                to_value(clause_context::get_clause_context(parse(skill_id, input)?))
            }
            SkillHandler::ResolveDefinition => {
                to_value(resolve_definition::resolve_definition(parse(skill_id, input)?))
            }
            SkillHandler::CompareWithBaseline => to_value(
                compare_with_baseline::compare_with_baseline(
                    parse(skill_id, input)?,
                    deps.llm.as_deref(),
                )
                .await,
            ),
            SkillHandler::CrossReferenceCheck => to_value(
                cross_reference_check::cross_reference_check(parse(skill_id, input)?),
            ),
            SkillHandler::ExtractFinancialTerms => to_value(
                extract_financial_terms::extract_financial_terms(parse(skill_id, input)?),
            ),
            SkillHandler::LoadReviewCriteria => to_value(
                load_review_criteria::load_review_criteria(parse(skill_id, input)?),
            ),
            SkillHandler::AssessDeviation => to_value(
                assess_deviation::assess_deviation(parse(skill_id, input)?, deps.llm.as_deref())
                    .await,
            ),
            SkillHandler::SearchReferenceDoc => {
                to_value(semantic_search::search_reference_doc(parse(skill_id, input)?))
            }
            SkillHandler::Remote { workflow_id } => {
                let client = deps.workflow.as_ref().ok_or_else(|| {
                    SkillError::InvalidRegistration {
                        skill_id: skill_id.to_string(),
                        reason: "remote skill without a workflow client".to_string(),
                    }
                })?;
                let run_id = client.submit(workflow_id, &input).await?;
                client.poll(&run_id).await
            }
        }
    }
}

fn parse<T: DeserializeOwned>(skill_id: &str, input: Value) -> Result<T, SkillError> {
    serde_json::from_value(input).map_err(|err| SkillError::InvalidInput {
        skill_id: skill_id.to_string(),
        reason: err.to_string(),
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value, SkillError> {
    Ok(serde_json::to_value(value)?)
}

/// String field lookup on the state-snapshot projection.
pub(crate) fn snapshot_str(snapshot: &Value, key: &str) -> String {
    snapshot
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Criteria rows carried by the state-snapshot projection.
pub(crate) fn snapshot_criteria(snapshot: &Value) -> Vec<Value> {
    snapshot
        .get("criteria_data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
