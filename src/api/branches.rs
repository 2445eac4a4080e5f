//! Lists the branches a caller may query within a schema.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::{authorize_schema, Authenticated};
use crate::authz::AuthorizedBranches;
use crate::error::ApiError;
use crate::http::server::AppState;
use crate::model::BranchCode;

#[derive(Debug, Deserialize)]
pub struct BranchesQuery {
    pub schema: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BranchesResponse {
    pub restricted: bool,
    /// Empty when unrestricted.
    pub branches: Vec<BranchCode>,
}

pub async fn list_branches(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Query(query): Query<BranchesQuery>,
) -> Result<Json<BranchesResponse>, ApiError> {
    authorize_schema(&state, &identity, query.schema.as_deref()).await?;

    let authorized = state.branches.authorized_branches(&identity).await?;
    let restricted = authorized.is_restricted();
    let branches = match authorized {
        AuthorizedBranches::Unrestricted => Vec::new(),
        AuthorizedBranches::Restricted(codes) => codes.into_iter().collect(),
    };
    Ok(Json(BranchesResponse {
        restricted,
        branches,
    }))
}
