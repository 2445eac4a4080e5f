//! Session refresh and page guard.
//!
//! Runs after the CSRF and rate-limit stages, so abusive clients are turned
//! away before this stage's collaborator round trips.
//!
//! # Decisions
//! ```text
//! public path                       → proceed (identity attached if any)
//! API path, no identity             → proceed; handlers answer 401
//! page, no identity                 → redirect to login
//! role-gated API path, role too low → 403
//! role-gated page, role too low     → redirect to default page
//! otherwise                         → proceed
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::config::SessionConfig;
use crate::directory::{SessionCookies, SessionOutcome};
use crate::error::ApiError;
use crate::http::request::matches_prefix;
use crate::http::server::AppState;
use crate::model::{Identity, Role};

/// Identity attached to the request by the session stage.
#[derive(Clone, Debug)]
pub struct CurrentIdentity(pub Option<Identity>);

/// What the guard decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Proceed,
    Redirect(String),
    Forbidden,
}

fn request_cookies(request: &Request<Body>) -> SessionCookies {
    let joined = request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    SessionCookies::parse(&joined)
}

/// Minimum role for `path`; the longest matching prefix wins.
pub fn required_role(config: &SessionConfig, path: &str) -> Option<Role> {
    config
        .protected_prefixes
        .iter()
        .filter(|p| matches_prefix(path, &p.prefix))
        .max_by_key(|p| p.prefix.len())
        .map(|p| p.min_role)
}

fn is_public(config: &SessionConfig, path: &str) -> bool {
    config.public_paths.iter().any(|p| matches_prefix(path, p))
}

/// Decide whether `path` may proceed for `identity`.
///
/// The profile is loaded at most once, and only for role-gated routes.
pub async fn route_decision(state: &AppState, path: &str, identity: Option<&Identity>) -> RouteDecision {
    let session = &state.config.session;

    if is_public(session, path) {
        return RouteDecision::Proceed;
    }

    let is_api = matches_prefix(path, &session.api_prefix);
    let Some(identity) = identity else {
        return if is_api {
            RouteDecision::Proceed
        } else {
            RouteDecision::Redirect(session.login_path.clone())
        };
    };

    let denied = if is_api {
        RouteDecision::Forbidden
    } else {
        RouteDecision::Redirect(session.default_path.clone())
    };

    let Some(required) = required_role(session, path) else {
        return RouteDecision::Proceed;
    };

    match state.collaborators.profiles.get_profile(identity.id).await {
        Ok(Some(profile)) if profile.role.satisfies(required) => RouteDecision::Proceed,
        Ok(profile) => {
            tracing::warn!(
                user_id = %identity.id,
                path = %path,
                role = ?profile.map(|p| p.role),
                required = ?required,
                "Insufficient role for route"
            );
            denied
        }
        Err(e) => {
            tracing::error!(user_id = %identity.id, error = %e, "Profile lookup failed during route guard");
            denied
        }
    }
}

/// Middleware refreshing the session and guarding page routes.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookies = request_cookies(&request);
    let outcome = match state.collaborators.sessions.refresh(&cookies).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "Session refresh failed; continuing without identity");
            SessionOutcome::default()
        }
    };

    let path = request.uri().path().to_string();
    let decision = route_decision(&state, &path, outcome.identity.as_ref()).await;

    let mut response = match decision {
        RouteDecision::Proceed => {
            request
                .extensions_mut()
                .insert(CurrentIdentity(outcome.identity));
            next.run(request).await
        }
        RouteDecision::Redirect(to) => {
            tracing::debug!(path = %path, redirect = %to, "Redirecting request");
            Redirect::temporary(&to).into_response()
        }
        RouteDecision::Forbidden => ApiError::Forbidden.into_response(),
    };

    for cookie in &outcome.set_cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(_) => tracing::warn!("Dropping malformed Set-Cookie value from session provider"),
        }
    }

    response
}
