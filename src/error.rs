//! Client-facing error taxonomy.
//!
//! Every variant renders as `{"error": <short message>}`. Messages are fixed
//! strings: lookup errors, table names and other tenants' schema names
//! never reach the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::directory::{BackendError, DirectoryError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// No identity on the request.
    #[error("unauthenticated")]
    Unauthenticated,
    /// Identity present, authorization denied.
    #[error("forbidden")]
    Forbidden,
    /// Malformed or missing input; the message is a fixed client-safe string.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    RateLimited,
    /// Collaborator or data backend failure, already logged.
    #[error("upstream failure")]
    Upstream,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "Unauthorized",
            ApiError::Forbidden => "Forbidden",
            ApiError::InvalidInput(message) => message,
            ApiError::NotFound => "Not found",
            ApiError::RateLimited => "Too many requests. Please try again later.",
            ApiError::Upstream => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.client_message() }))).into_response()
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        tracing::error!(error = %err, "Directory lookup failed");
        ApiError::Upstream
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        tracing::error!(error = %err, "Data backend call failed");
        ApiError::Upstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::InvalidInput("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::Upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_backend_error_is_redacted() {
        let err: ApiError = BackendError::Rejected {
            operation: "get_sales".into(),
            status: 400,
            body: "relation \"saoluiz.vendas\" does not exist".into(),
        }
        .into();

        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }
}
