//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Route handler (schema, filiais from request)
//!     → whitelist.rs (static membership, no I/O)
//!     → schema.rs (profile + tenant lookups → allow/deny)
//!     → branches.rs (grants → authorized set → effective filter)
//!     → data backend call
//! ```
//!
//! # Design Decisions
//! - Deny is indistinguishable across causes (not whitelisted, inactive, wrong tenant)
//! - No caching: profile and grant changes apply to the next request
//! - Fail closed on any collaborator failure

pub mod branches;
pub mod schema;
pub mod whitelist;

pub use branches::{
    narrow_single, reconcile, AuthorizedBranches, BranchAuthorizer, BranchFilter, BranchRequest,
    BranchSelection,
};
pub use schema::SchemaAccessValidator;
pub use whitelist::SchemaWhitelist;
