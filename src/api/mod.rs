//! HTTP handlers behind the gatekeeper.
//!
//! # Data Flow
//! ```text
//! request (identity attached by the session stage)
//!     → Authenticated extractor (401 without identity)
//!     → authorize_schema (400 malformed, 403 denied)
//!     → branch resolver → data backend → JSON
//! ```
//!
//! # Design Decisions
//! - Every handler that takes a schema goes through `authorize_schema`
//! - Responses never say why access was denied

pub mod branches;
pub mod catalog;
pub mod health;
pub mod reports;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};

use crate::authz::whitelist::is_valid_schema_name;
use crate::error::ApiError;
use crate::http::middleware::CurrentIdentity;
use crate::http::server::AppState;
use crate::model::Identity;

pub use catalog::EndpointCatalog;

/// All routes served by the gate.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/branches", get(branches::list_branches))
        .route("/api/reports/{slug}", get(reports::run_report))
        .route("/api/operations/{slug}", post(reports::run_operation))
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// The caller's identity; rejects with 401 when the session stage found none.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<CurrentIdentity>() {
            Some(CurrentIdentity(Some(identity))) => Ok(Self(identity.clone())),
            _ => Err(ApiError::Unauthenticated),
        }
    }
}

/// Validate the requested schema and check the caller may use it.
pub(crate) async fn authorize_schema(
    state: &AppState,
    identity: &Identity,
    schema: Option<&str>,
) -> Result<String, ApiError> {
    let schema = schema
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::InvalidInput("Missing schema parameter"))?;

    if !is_valid_schema_name(schema) {
        return Err(ApiError::InvalidInput("Invalid schema name"));
    }

    if !state.schema_access.has_access(identity, schema).await {
        return Err(ApiError::Forbidden);
    }

    Ok(schema.to_string())
}
