//! The built-in generic skill set (domain `*`).

use schemars::{JsonSchema, schema_for};
use serde_json::Value;

use crate::local::SkillHandler;
use crate::local::{
    assess_deviation::AssessDeviationInput, clause_context::ClauseContextInput,
    compare_with_baseline::CompareWithBaselineInput,
    cross_reference_check::CrossReferenceCheckInput,
    extract_financial_terms::ExtractFinancialTermsInput,
    load_review_criteria::LoadReviewCriteriaInput, resolve_definition::ResolveDefinitionInput,
    semantic_search::SearchReferenceDocInput,
};
use crate::schema::{SkillBackend, SkillRegistration, SkillStatus, strip_internal_fields};

fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = serde_json::to_value(schema_for!(T)).unwrap_or_default();
    strip_internal_fields(&schema)
}

fn local(
    skill_id: &str,
    name: &str,
    description: &str,
    category: &str,
    handler: SkillHandler,
    parameters_schema: Value,
) -> SkillRegistration {
    SkillRegistration {
        skill_id: skill_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        backend: SkillBackend::Local,
        handler,
        domain: "*".to_string(),
        category: category.to_string(),
        status: SkillStatus::Active,
        parameters_schema,
    }
}

/// All generic skills, ready for registration.
pub fn generic_skills() -> Vec<SkillRegistration> {
    vec![
        local(
            "get_clause_context",
            "Get clause context",
            "Extract the full text of a clause (including sub-clauses) from the document structure",
            "extraction",
            SkillHandler::ClauseContext,
            parameters_schema::<ClauseContextInput>(),
        ),
        local(
            "resolve_definition",
            "Resolve definitions",
            "Look up the definitions of terms referenced by a clause",
            "extraction",
            SkillHandler::ResolveDefinition,
            parameters_schema::<ResolveDefinitionInput>(),
        ),
        local(
            "compare_with_baseline",
            "Compare with baseline",
            "Compare the clause text against the domain's baseline wording",
            "comparison",
            SkillHandler::CompareWithBaseline,
            parameters_schema::<CompareWithBaselineInput>(),
        ),
        local(
            "cross_reference_check",
            "Cross-reference check",
            "Validate whether the clause's cross references point at existing clauses",
            "validation",
            SkillHandler::CrossReferenceCheck,
            parameters_schema::<CrossReferenceCheckInput>(),
        ),
        local(
            "extract_financial_terms",
            "Extract financial terms",
            "Extract amounts, percentages, durations and dates from the clause",
            "extraction",
            SkillHandler::ExtractFinancialTerms,
            parameters_schema::<ExtractFinancialTermsInput>(),
        ),
        local(
            "search_reference_doc",
            "Search reference documents",
            "Find passages in reference documents related to the current clause",
            "validation",
            SkillHandler::SearchReferenceDoc,
            parameters_schema::<SearchReferenceDocInput>(),
        ),
        local(
            "load_review_criteria",
            "Load review criteria",
            "Load review criteria and match them to the current clause",
            "validation",
            SkillHandler::LoadReviewCriteria,
            parameters_schema::<LoadReviewCriteriaInput>(),
        ),
        local(
            "assess_deviation",
            "Assess deviation",
            "Grade the clause's deviation and risk against matched review criteria",
            "comparison",
            SkillHandler::AssessDeviation,
            parameters_schema::<AssessDeviationInput>(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::INTERNAL_FIELDS;

    #[test]
    fn eight_generic_skills() {
        let skills = generic_skills();
        assert_eq!(skills.len(), 8);
        assert!(skills.iter().all(|s| s.domain == "*"));
    }

    #[test]
    fn no_internal_fields_in_any_projection() {
        for skill in generic_skills() {
            let props = skill.parameters_schema["properties"]
                .as_object()
                .cloned()
                .unwrap_or_default();
            for field in INTERNAL_FIELDS {
                assert!(
                    !props.contains_key(field),
                    "{} exposes internal field {}",
                    skill.skill_id,
                    field
                );
            }
        }
    }

    #[test]
    fn clause_id_survives_projection() {
        let skills = generic_skills();
        let ctx = skills.iter().find(|s| s.skill_id == "get_clause_context").unwrap();
        assert!(
            ctx.parameters_schema["properties"]
                .as_object()
                .unwrap()
                .contains_key("clause_id")
        );
    }
}
