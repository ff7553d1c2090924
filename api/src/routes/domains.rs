//! Read-only domain plugin catalog.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use contract_model::plugin::{get_domain_plugin, list_domain_plugins};

use crate::core::app_state::AppState;
use crate::error_handler::{ApiError, ApiResult};

pub async fn list_domains(State(_state): State<Arc<AppState>>) -> Json<Value> {
    let domains: Vec<Value> = list_domain_plugins()
        .into_iter()
        .map(|p| {
            json!({
                "domain_id": p.domain_id,
                "name": p.name,
                "description": p.description,
                "supported_subtypes": p.supported_subtypes,
                "checklist_count": p.review_checklist.len(),
            })
        })
        .collect();
    Json(json!({ "domains": domains }))
}

pub async fn get_domain(
    State(_state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let plugin = get_domain_plugin(&domain_id)
        .ok_or_else(|| ApiError::NotFound(format!("domain '{domain_id}' does not exist")))?;
    Ok(Json(json!({
        "domain_id": plugin.domain_id,
        "name": plugin.name,
        "description": plugin.description,
        "supported_subtypes": plugin.supported_subtypes,
        "review_checklist": plugin.review_checklist,
    })))
}

pub async fn get_domain_checklist(
    State(_state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let plugin = get_domain_plugin(&domain_id)
        .ok_or_else(|| ApiError::NotFound(format!("domain '{domain_id}' does not exist")))?;
    Ok(Json(json!({
        "domain_id": domain_id,
        "checklist": plugin.review_checklist,
    })))
}
