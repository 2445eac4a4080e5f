//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → csrf.rs (Origin vs Host on mutating methods)
//!     → rate_limit.rs (per-category fixed window per client)
//!         uses headers.rs (client identifier from peer / trusted proxy headers)
//!     → session refresh (http::middleware::session)
//! ```
//!
//! # Design Decisions
//! - Cheap checks first: abuse is rejected before any database round trip
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod csrf;
pub mod headers;
pub mod rate_limit;
