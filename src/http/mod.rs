//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout, body limit)
//!     → middleware/ (gatekeeper: CSRF → rate limit → session refresh)
//!     → api/ handlers (schema + branch authorization → data backend)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{matches_prefix, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
