//! Cross-site request forgery defense by Origin/Host comparison.
//!
//! # Rules
//! - Only POST, PUT, PATCH and DELETE are checked
//! - No Origin header: allowed (same-origin navigations may omit it)
//! - Origin host (with explicit non-default port) must equal the Host header
//!
//! A request without Origin is an accepted gap of this check, not a bug.

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use url::Url;

use crate::http::server::AppState;
use crate::observability::metrics;

/// Outcome of an origin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfVerdict {
    Allow,
    Reject,
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// `host[:port]` of an Origin, as a browser's `URL.host` reports it.
fn origin_authority(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Compare a request's Origin against its Host.
pub fn validate(method: &Method, origin: Option<&str>, host: Option<&str>) -> CsrfVerdict {
    if !is_mutating(method) {
        return CsrfVerdict::Allow;
    }
    let Some(origin) = origin else {
        return CsrfVerdict::Allow;
    };
    match (origin_authority(origin), host) {
        (Some(origin_host), Some(host)) if origin_host == host => CsrfVerdict::Allow,
        _ => CsrfVerdict::Reject,
    }
}

/// Middleware rejecting cross-origin mutating requests with a generic 403.
pub async fn csrf_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.security.csrf_enabled {
        return next.run(request).await;
    }

    let headers = request.headers();
    // A present but non-UTF-8 Origin must not pass as "absent".
    let origin = headers
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default());
    // HTTP/2 requests carry the authority in the URI instead of a Host header.
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()));

    if validate(request.method(), origin, host) == CsrfVerdict::Reject {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            origin = origin.unwrap_or_default(),
            host = host.unwrap_or_default(),
            "CSRF origin mismatch"
        );
        metrics::record_csrf_rejected();
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid request origin" })),
        )
            .into_response();
    }

    next.run(request).await
}
