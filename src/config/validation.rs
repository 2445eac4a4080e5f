//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (quotas and windows > 0)
//! - Check the schema whitelist is usable as raw identifiers
//! - Detect duplicate endpoint slugs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;

use crate::authz::whitelist::is_valid_schema_name;
use crate::config::schema::{BackendKind, GateConfig, QuotaConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tenancy.schema_whitelist must not be empty")]
    EmptyWhitelist,
    #[error("schema name `{0}` is not a valid identifier")]
    InvalidSchemaName(String),
    #[error("rate_limit.{0}: limit and window_secs must be greater than zero")]
    ZeroQuota(&'static str),
    #[error("rate_limit.sweep_interval_secs must be greater than zero")]
    ZeroSweepInterval,
    #[error("{field}: path `{path}` must start with '/'")]
    RelativePath { field: &'static str, path: String },
    #[error("backend.url is required for the rest backend")]
    MissingBackendUrl,
    #[error("backend.url `{0}` is not a valid URL")]
    InvalidBackendUrl(String),
    #[error("duplicate endpoint slug `{0}`")]
    DuplicateSlug(String),
    #[error("audit.queue_capacity must be greater than zero")]
    ZeroAuditCapacity,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.tenancy.schema_whitelist.is_empty() {
        errors.push(ValidationError::EmptyWhitelist);
    }
    for name in &config.tenancy.schema_whitelist {
        if !is_valid_schema_name(name) {
            errors.push(ValidationError::InvalidSchemaName(name.clone()));
        }
    }

    let limits = &config.rate_limit;
    check_quota(&mut errors, "auth", limits.auth);
    check_quota(&mut errors, "reports", limits.reports);
    check_quota(&mut errors, "standard", limits.standard);
    if limits.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }
    check_paths(&mut errors, "rate_limit.auth_prefixes", &limits.auth_prefixes);
    check_paths(&mut errors, "rate_limit.reports_prefixes", &limits.reports_prefixes);
    check_paths(&mut errors, "rate_limit.exempt_paths", &limits.exempt_paths);

    let session = &config.session;
    check_paths(&mut errors, "session.login_path", std::slice::from_ref(&session.login_path));
    check_paths(&mut errors, "session.default_path", std::slice::from_ref(&session.default_path));
    check_paths(&mut errors, "session.api_prefix", std::slice::from_ref(&session.api_prefix));
    check_paths(&mut errors, "session.public_paths", &session.public_paths);
    let protected: Vec<String> = session
        .protected_prefixes
        .iter()
        .map(|p| p.prefix.clone())
        .collect();
    check_paths(&mut errors, "session.protected_prefixes", &protected);

    if config.backend.kind == BackendKind::Rest {
        if config.backend.url.is_empty() {
            errors.push(ValidationError::MissingBackendUrl);
        } else if url::Url::parse(&config.backend.url).is_err() {
            errors.push(ValidationError::InvalidBackendUrl(config.backend.url.clone()));
        }
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !seen.insert(endpoint.slug.as_str()) {
            errors.push(ValidationError::DuplicateSlug(endpoint.slug.clone()));
        }
    }

    if config.audit.queue_capacity == 0 {
        errors.push(ValidationError::ZeroAuditCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_quota(errors: &mut Vec<ValidationError>, name: &'static str, quota: QuotaConfig) {
    if quota.limit == 0 || quota.window_secs == 0 {
        errors.push(ValidationError::ZeroQuota(name));
    }
}

fn check_paths(errors: &mut Vec<ValidationError>, field: &'static str, paths: &[String]) {
    for path in paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::RelativePath {
                field,
                path: path.clone(),
            });
        }
    }
}
