//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::model::Role;

/// Root configuration for the access-control gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// CSRF and client identification settings.
    pub security: SecurityConfig,

    /// Per-category rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Tenant schema whitelist.
    pub tenancy: TenancyConfig,

    /// Session refresh and route guards.
    pub session: SessionConfig,

    /// Identity and data backend collaborators.
    pub backend: BackendConfig,

    /// Endpoint catalog mapping slugs to backend operations.
    pub endpoints: Vec<EndpointConfig>,

    /// Audit trail settings.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Reject cross-origin mutating requests.
    pub csrf_enabled: bool,
    /// Peers whose X-Forwarded-For / X-Real-IP headers are trusted.
    pub trusted_proxies: Vec<IpAddr>,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            csrf_enabled: true,
            trusted_proxies: Vec::new(),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// A fixed-window quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuotaConfig {
    /// Requests allowed per window.
    pub limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Login and token endpoints.
    pub auth: QuotaConfig,

    /// Heavy report queries.
    pub reports: QuotaConfig,

    /// Everything else.
    pub standard: QuotaConfig,

    /// Path prefixes classified as auth traffic.
    pub auth_prefixes: Vec<String>,

    /// Path prefixes classified as report traffic.
    pub reports_prefixes: Vec<String>,

    /// Paths never rate limited.
    pub exempt_paths: Vec<String>,

    /// Interval of the expired-window sweep in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: QuotaConfig { limit: 10, window_secs: 60 },
            reports: QuotaConfig { limit: 30, window_secs: 60 },
            standard: QuotaConfig { limit: 100, window_secs: 60 },
            auth_prefixes: vec!["/api/auth".to_string(), "/login".to_string()],
            reports_prefixes: vec!["/api/reports".to_string()],
            exempt_paths: vec!["/healthz".to_string()],
            sweep_interval_secs: 60,
        }
    }
}

/// Tenant isolation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Schema names that may ever reach a backend call.
    pub schema_whitelist: Vec<String>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            schema_whitelist: vec![
                "okilao".to_string(),
                "saoluiz".to_string(),
                "paraiso".to_string(),
                "lucia".to_string(),
            ],
        }
    }
}

/// A path prefix restricted to a minimum role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProtectedPrefix {
    pub prefix: String,
    pub min_role: Role,
}

/// Session refresh and page guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the access token.
    pub access_cookie: String,
    /// Cookie carrying the refresh token.
    pub refresh_cookie: String,
    /// Max-Age of re-issued session cookies in seconds.
    pub cookie_max_age_secs: u64,
    /// Mark re-issued cookies `Secure`.
    pub secure_cookies: bool,
    /// Where unauthenticated page requests are sent.
    pub login_path: String,
    /// Where authenticated users without the required role are sent.
    pub default_path: String,
    /// Paths (prefix match) reachable without a session.
    pub public_paths: Vec<String>,
    /// Prefix of JSON API routes; these answer 401 instead of redirecting.
    pub api_prefix: String,
    /// Role-gated page prefixes.
    pub protected_prefixes: Vec<ProtectedPrefix>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_cookie: "sb-access-token".to_string(),
            refresh_cookie: "sb-refresh-token".to_string(),
            cookie_max_age_secs: 60 * 60 * 24 * 7,
            secure_cookies: true,
            login_path: "/login".to_string(),
            default_path: "/dashboard".to_string(),
            public_paths: vec![
                "/login".to_string(),
                "/api/auth".to_string(),
                "/healthz".to_string(),
            ],
            api_prefix: "/api".to_string(),
            protected_prefixes: vec![
                ProtectedPrefix {
                    prefix: "/admin".to_string(),
                    min_role: Role::Superadmin,
                },
                ProtectedPrefix {
                    prefix: "/settings/users".to_string(),
                    min_role: Role::Admin,
                },
            ],
        }
    }
}

/// Collaborator implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PostgREST/GoTrue style managed backend over HTTP.
    Rest,
    /// In-process directory (development and tests).
    Memory,
}

/// Backend collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Base URL of the managed backend.
    pub url: String,
    /// Service key used for directory lookups and operation calls.
    pub service_key: String,
    /// Seed file for the memory backend.
    pub seed_path: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            url: String::new(),
            service_key: String::new(),
            seed_path: None,
            timeout_secs: 10,
        }
    }
}

/// How an endpoint scopes its branch filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointScope {
    /// Report over a set of branches (`GET /api/reports/{slug}`).
    MultiBranch,
    /// Operation on one branch (`POST /api/operations/{slug}`).
    SingleBranch,
}

/// Maps a public slug to a backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub slug: String,
    pub operation: String,
    pub scope: EndpointScope,
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record successful report and operation calls.
    pub enabled: bool,
    /// Pending events kept before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
