//! Report and operation endpoints.
//!
//! # Parameters sent to the backend
//! ```text
//! GET  /api/reports/{slug}?schema=s&filiais=1,2&data_inicio=...
//!      → call(s, op, {"p_filiais": "<reconciled>", "p_data_inicio": ...})
//! POST /api/operations/{slug} {"schema": s, "filial": "3", "params": {...}}
//!      → call(s, op, {...params, "p_filial": "<narrowed>"})
//! ```
//!
//! Branch parameters are always overwritten by the resolver's output, so a
//! caller cannot smuggle a branch filter in through the extra parameters.

use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::api::{authorize_schema, Authenticated};
use crate::authz::{narrow_single, reconcile, BranchRequest};
use crate::config::EndpointScope;
use crate::directory::AuditEvent;
use crate::error::ApiError;
use crate::http::server::AppState;
use crate::model::Identity;

const SCHEMA_PARAM: &str = "schema";
const BRANCHES_PARAM: &str = "filiais";
const BRANCH_FILTER_ARG: &str = "p_filiais";
const BRANCH_SELECTION_ARG: &str = "p_filial";

/// Backend argument name for a forwarded query parameter.
fn argument_name(key: &str) -> String {
    if key.starts_with("p_") {
        key.to_string()
    } else {
        format!("p_{key}")
    }
}

fn audit(state: &AppState, identity: &Identity, schema: &str, action: String, details: Value) {
    state.audit.record(AuditEvent {
        user_id: identity.id,
        user_email: identity.email.clone(),
        schema_name: schema.to_string(),
        action,
        details,
    });
}

/// Multi-branch report over the reconciled branch filter.
pub async fn run_report(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(slug): Path<String>,
    Query(mut query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let schema = authorize_schema(&state, &identity, query.get(SCHEMA_PARAM).map(String::as_str)).await?;

    let endpoint = state
        .endpoints
        .resolve(&slug, EndpointScope::MultiBranch)
        .ok_or(ApiError::NotFound)?;

    let authorized = state.branches.authorized_branches(&identity).await?;
    let request = BranchRequest::parse(query.get(BRANCHES_PARAM).map(String::as_str));
    let filter = reconcile(&authorized, &request);

    query.remove(SCHEMA_PARAM);
    query.remove(BRANCHES_PARAM);
    let mut params: Map<String, Value> = query
        .into_iter()
        .map(|(key, value)| (argument_name(&key), Value::String(value)))
        .collect();
    params.remove(BRANCH_SELECTION_ARG);
    params.insert(BRANCH_FILTER_ARG.to_string(), Value::String(filter.to_param()));

    tracing::debug!(
        user_id = %identity.id,
        schema = %schema,
        operation = %endpoint.operation,
        filter = %filter.to_param(),
        "Running report"
    );

    let result = state
        .collaborators
        .backend
        .call(&schema, &endpoint.operation, Value::Object(params))
        .await?;

    audit(
        &state,
        &identity,
        &schema,
        format!("report:{slug}"),
        json!({ "operation": endpoint.operation, "filiais": filter.to_param() }),
    );

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct OperationRequest {
    pub schema: Option<String>,
    pub filial: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Single-branch operation on the narrowed branch.
pub async fn run_operation(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(slug): Path<String>,
    body: Result<Json<OperationRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!(error = %e, "Rejected operation body");
        ApiError::InvalidInput("Invalid request body")
    })?;
    let schema = authorize_schema(&state, &identity, body.schema.as_deref()).await?;

    let endpoint = state
        .endpoints
        .resolve(&slug, EndpointScope::SingleBranch)
        .ok_or(ApiError::NotFound)?;

    let authorized = state.branches.authorized_branches(&identity).await?;
    let selection = narrow_single(&authorized, &BranchRequest::parse(body.filial.as_deref()));

    let mut params = body.params;
    params.remove(BRANCH_FILTER_ARG);
    params.insert(BRANCH_SELECTION_ARG.to_string(), Value::String(selection.to_param()));

    let result = state
        .collaborators
        .backend
        .call(&schema, &endpoint.operation, Value::Object(params))
        .await?;

    audit(
        &state,
        &identity,
        &schema,
        format!("operation:{slug}"),
        json!({ "operation": endpoint.operation, "filial": selection.to_param() }),
    );

    Ok(Json(result))
}
