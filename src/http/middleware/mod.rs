//! Request gatekeeper.
//!
//! # State Machine
//! ```text
//! START → CSRF_CHECK → RATE_LIMIT_CHECK → SESSION_REFRESH → ROUTE_DISPATCH
//!            │               │                  │
//!            ▼               ▼                  ▼
//!          403             429           redirect (login / default)
//! ```
//!
//! # Design Decisions
//! - Terminal at the first rejection
//! - CSRF and rate limiting are O(1) in-memory checks and run before the
//!   session stage's collaborator round trips

pub mod session;

use axum::{middleware, Router};
use tower::ServiceBuilder;

use crate::http::server::AppState;
use crate::security::{csrf::csrf_middleware, rate_limit::rate_limit_middleware};

pub use session::{route_decision, session_middleware, CurrentIdentity, RouteDecision};

/// Wrap every route of `router` in the gatekeeper stages, outermost first.
pub fn apply_gatekeeper(router: Router, state: AppState) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(state.clone(), csrf_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
            .layer(middleware::from_fn_with_state(state, session_middleware)),
    )
}
