//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the schema whitelist never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Secrets and collaborator URLs may come from the environment
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AuditConfig, BackendConfig, BackendKind, EndpointConfig, EndpointScope, GateConfig,
    ListenerConfig, ObservabilityConfig, ProtectedPrefix, QuotaConfig, RateLimitConfig,
    SecurityConfig, SessionConfig, TenancyConfig, TimeoutConfig,
};
