//! Tenant Gate Library
//!
//! Request-boundary access control for a multi-tenant reporting backend:
//! CSRF origin checks, fixed-window rate limiting, session refresh with
//! page guards, tenant schema isolation and branch-level data filtering.

pub mod api;
pub mod audit;
pub mod authz;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod security;

pub use config::schema::GateConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
