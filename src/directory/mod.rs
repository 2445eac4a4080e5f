//! External collaborators consulted by the access-control layer.
//!
//! # Data Flow
//! ```text
//! Gatekeeper:      SessionProvider  (cookies → Identity)
//!                  ProfileStore     (role-gated prefixes)
//!
//! Route handlers:  ProfileStore + TenantDirectory  → schema access
//!                  BranchGrants                    → branch authorization
//!                  DataBackend                     → named operation call
//!                  AuditSink (background worker)   → audit trail
//! ```
//!
//! # Design Decisions
//! - Every collaborator is a trait object injected at startup; no global client
//! - No caching: each call reflects the latest committed state
//! - No retries: a failed lookup is returned to the caller, which fails closed

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{BranchCode, Identity, IdentityId, Profile, Tenant, TenantId};

pub use memory::MemoryDirectory;
pub use rest::RestDirectory;

/// Failure talking to the identity, tenant or grant stores.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory transport error: {0}")]
    Transport(String),
    #[error("directory returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode directory response: {0}")]
    Decode(String),
}

/// Failure executing a named operation on the data backend.
///
/// The payload may embed internal schema, table or function names. It is
/// logged server-side and never forwarded to clients.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("data backend transport error: {0}")]
    Transport(String),
    #[error("data backend rejected `{operation}` with status {status}: {body}")]
    Rejected {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode data backend response: {0}")]
    Decode(String),
}

/// Session cookies presented by the client, by name.
#[derive(Debug, Clone, Default)]
pub struct SessionCookies(HashMap<String, String>);

impl SessionCookies {
    /// Parse a `Cookie` request header (`a=1; b=2`).
    pub fn parse(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self(cookies)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of refreshing a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    /// The authenticated identity, if the session is valid.
    pub identity: Option<Identity>,
    /// Complete `Set-Cookie` header values to attach to the response.
    pub set_cookies: Vec<String>,
}

/// One entry of the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub user_id: IdentityId,
    pub user_email: Option<String>,
    pub schema_name: String,
    pub action: String,
    pub details: serde_json::Value,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Validate (and if needed refresh) the session carried by `cookies`.
    async fn refresh(&self, cookies: &SessionCookies) -> Result<SessionOutcome, DirectoryError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: IdentityId) -> Result<Option<Profile>, DirectoryError>;
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_tenant_by_schema(&self, schema: &str) -> Result<Option<Tenant>, DirectoryError>;
    async fn find_tenant_by_id(&self, id: TenantId) -> Result<Option<Tenant>, DirectoryError>;
}

#[async_trait]
pub trait BranchGrants: Send + Sync {
    /// Branch codes granted to `id`. An empty list means no restriction.
    async fn get_branch_grants(&self, id: IdentityId) -> Result<Vec<BranchCode>, DirectoryError>;
}

#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Execute `operation` against the tenant namespace `schema`.
    async fn call(
        &self,
        schema: &str,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), DirectoryError>;
}

/// The full set of collaborators, shared by the gatekeeper and handlers.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub grants: Arc<dyn BranchGrants>,
    pub backend: Arc<dyn DataBackend>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// Use one implementation for every collaborator role.
    pub fn from_shared<T>(directory: Arc<T>) -> Self
    where
        T: SessionProvider
            + ProfileStore
            + TenantDirectory
            + BranchGrants
            + DataBackend
            + AuditSink
            + 'static,
    {
        Self {
            sessions: directory.clone(),
            profiles: directory.clone(),
            tenants: directory.clone(),
            grants: directory.clone(),
            backend: directory.clone(),
            audit: directory,
        }
    }
}
