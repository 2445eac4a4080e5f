//! In-process collaborator implementation.
//!
//! Backs local development (optionally seeded from a JSON file) and the
//! test suites. Lookup counters let tests assert which collaborators an
//! authorization decision touched.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{
    AuditEvent, AuditSink, BackendError, BranchGrants, DataBackend, DirectoryError, ProfileStore,
    SessionCookies, SessionOutcome, SessionProvider, TenantDirectory,
};
use crate::model::{BranchCode, Identity, IdentityId, Profile, Tenant, TenantId};

/// Seed file layout for [`MemoryDirectory::load_from_file`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemorySeed {
    pub tenants: Vec<Tenant>,
    pub profiles: HashMap<IdentityId, Profile>,
    pub grants: HashMap<IdentityId, Vec<BranchCode>>,
    /// Access token → identity.
    pub sessions: HashMap<String, Identity>,
    /// Canned responses by operation name.
    pub operations: HashMap<String, serde_json::Value>,
}

/// A data backend call captured for inspection.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub schema: String,
    pub operation: String,
    pub params: serde_json::Value,
}

/// Per-collaborator lookup counters.
#[derive(Debug, Default)]
pub struct LookupCounts {
    pub sessions: AtomicUsize,
    pub profiles: AtomicUsize,
    pub tenants: AtomicUsize,
    pub grants: AtomicUsize,
}

impl LookupCounts {
    /// Profile plus tenant lookups.
    pub fn identity_lookups(&self) -> usize {
        self.profiles.load(Ordering::SeqCst) + self.tenants.load(Ordering::SeqCst)
    }
}

/// Thread-safe in-memory directory implementing every collaborator trait.
pub struct MemoryDirectory {
    session_cookie: String,
    tenants: DashMap<TenantId, Tenant>,
    profiles: DashMap<IdentityId, Profile>,
    grants: DashMap<IdentityId, Vec<BranchCode>>,
    sessions: DashMap<String, Identity>,
    operations: DashMap<String, serde_json::Value>,
    failing_operations: DashMap<String, String>,
    calls: Mutex<Vec<RecordedCall>>,
    audit_log: Mutex<Vec<AuditEvent>>,
    fail_lookups: AtomicBool,
    pub counts: LookupCounts,
}

impl MemoryDirectory {
    /// Create an empty directory whose sessions are keyed by `session_cookie`.
    pub fn new(session_cookie: impl Into<String>) -> Self {
        Self {
            session_cookie: session_cookie.into(),
            tenants: DashMap::new(),
            profiles: DashMap::new(),
            grants: DashMap::new(),
            sessions: DashMap::new(),
            operations: DashMap::new(),
            failing_operations: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            audit_log: Mutex::new(Vec::new()),
            fail_lookups: AtomicBool::new(false),
            counts: LookupCounts::default(),
        }
    }

    /// Build a directory from a seed.
    pub fn from_seed(session_cookie: impl Into<String>, seed: MemorySeed) -> Self {
        let directory = Self::new(session_cookie);
        for tenant in seed.tenants {
            directory.insert_tenant(tenant);
        }
        for (id, profile) in seed.profiles {
            directory.insert_profile(id, profile);
        }
        for (id, codes) in seed.grants {
            directory.set_grants(id, codes);
        }
        for (token, identity) in seed.sessions {
            directory.insert_session(token, identity);
        }
        for (operation, response) in seed.operations {
            directory.set_operation_response(operation, response);
        }
        directory
    }

    /// Load a JSON seed file.
    pub fn load_from_file(session_cookie: impl Into<String>, path: &Path) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let seed: MemorySeed = serde_json::from_reader(reader)?;
        let directory = Self::from_seed(session_cookie, seed);
        tracing::info!(
            tenants = directory.tenants.len(),
            profiles = directory.profiles.len(),
            "Loaded in-memory directory seed"
        );
        Ok(directory)
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn insert_profile(&self, id: IdentityId, profile: Profile) {
        self.profiles.insert(id, profile);
    }

    pub fn remove_profile(&self, id: IdentityId) {
        self.profiles.remove(&id);
    }

    pub fn set_grants(&self, id: IdentityId, codes: Vec<BranchCode>) {
        self.grants.insert(id, codes);
    }

    pub fn insert_session(&self, token: impl Into<String>, identity: Identity) {
        self.sessions.insert(token.into(), identity);
    }

    pub fn set_operation_response(&self, operation: impl Into<String>, response: serde_json::Value) {
        self.operations.insert(operation.into(), response);
    }

    /// Make `operation` fail with `message` as the backend error body.
    pub fn fail_operation(&self, operation: impl Into<String>, message: impl Into<String>) {
        self.failing_operations.insert(operation.into(), message.into());
    }

    /// Make every identity, tenant and grant lookup fail.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("call log mutex poisoned").clone()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit_log.lock().expect("audit log mutex poisoned").clone()
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport("directory unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for MemoryDirectory {
    async fn refresh(&self, cookies: &SessionCookies) -> Result<SessionOutcome, DirectoryError> {
        self.counts.sessions.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let identity = cookies
            .get(&self.session_cookie)
            .and_then(|token| self.sessions.get(token).map(|r| r.value().clone()));
        Ok(SessionOutcome {
            identity,
            set_cookies: Vec::new(),
        })
    }
}

#[async_trait]
impl ProfileStore for MemoryDirectory {
    async fn get_profile(&self, id: IdentityId) -> Result<Option<Profile>, DirectoryError> {
        self.counts.profiles.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.profiles.get(&id).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl TenantDirectory for MemoryDirectory {
    async fn find_tenant_by_schema(&self, schema: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.counts.tenants.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        // Prefer the active tenant when an inactive one shares the schema name.
        let mut found: Option<Tenant> = None;
        for entry in self.tenants.iter() {
            let tenant = entry.value();
            if tenant.schema_name != schema {
                continue;
            }
            if tenant.is_active || found.is_none() {
                found = Some(tenant.clone());
            }
            if tenant.is_active {
                break;
            }
        }
        Ok(found)
    }

    async fn find_tenant_by_id(&self, id: TenantId) -> Result<Option<Tenant>, DirectoryError> {
        self.counts.tenants.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.tenants.get(&id).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl BranchGrants for MemoryDirectory {
    async fn get_branch_grants(&self, id: IdentityId) -> Result<Vec<BranchCode>, DirectoryError> {
        self.counts.grants.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.grants.get(&id).map(|r| r.value().clone()).unwrap_or_default())
    }
}

#[async_trait]
impl DataBackend for MemoryDirectory {
    async fn call(
        &self,
        schema: &str,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        self.calls
            .lock()
            .expect("call log mutex poisoned")
            .push(RecordedCall {
                schema: schema.to_string(),
                operation: operation.to_string(),
                params: params.clone(),
            });

        if let Some(message) = self.failing_operations.get(operation) {
            return Err(BackendError::Rejected {
                operation: operation.to_string(),
                status: 400,
                body: message.value().clone(),
            });
        }

        Ok(self
            .operations
            .get(operation)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| serde_json::json!([])))
    }
}

#[async_trait]
impl AuditSink for MemoryDirectory {
    async fn record(&self, event: AuditEvent) -> Result<(), DirectoryError> {
        self.check_available()?;
        self.audit_log
            .lock()
            .expect("audit log mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_session_lookup_by_cookie() {
        let directory = MemoryDirectory::new("sb-access-token");
        let identity = Identity {
            id: IdentityId(Uuid::new_v4()),
            email: Some("ana@example.com".into()),
        };
        directory.insert_session("tok-1", identity.clone());

        let outcome = directory
            .refresh(&SessionCookies::parse("sb-access-token=tok-1"))
            .await
            .unwrap();
        assert_eq!(outcome.identity, Some(identity));

        let outcome = directory
            .refresh(&SessionCookies::parse("sb-access-token=other"))
            .await
            .unwrap();
        assert!(outcome.identity.is_none());
    }

    #[tokio::test]
    async fn test_schema_lookup_prefers_active_tenant() {
        let directory = MemoryDirectory::new("sb-access-token");
        directory.insert_tenant(Tenant {
            id: TenantId(Uuid::new_v4()),
            schema_name: "okilao".into(),
            is_active: false,
        });
        let active = Tenant {
            id: TenantId(Uuid::new_v4()),
            schema_name: "okilao".into(),
            is_active: true,
        };
        directory.insert_tenant(active.clone());

        let found = directory.find_tenant_by_schema("okilao").await.unwrap();
        assert_eq!(found, Some(active));
    }

    #[tokio::test]
    async fn test_failing_lookups() {
        let directory = MemoryDirectory::new("sb-access-token");
        directory.set_fail_lookups(true);
        let result = directory.get_profile(IdentityId(Uuid::new_v4())).await;
        assert!(matches!(result, Err(DirectoryError::Transport(_))));
        assert_eq!(directory.counts.profiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seed_parsing() {
        let id = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let json = serde_json::json!({
            "tenants": [{"id": tenant, "schema_name": "okilao", "is_active": true}],
            "profiles": { id.to_string(): {"role": "user", "tenant_id": tenant} },
            "grants": { id.to_string(): ["1", "3"] },
            "sessions": { "tok": {"id": id} }
        });
        let seed: MemorySeed = serde_json::from_value(json).unwrap();
        let directory = MemoryDirectory::from_seed("sb-access-token", seed);
        assert_eq!(directory.tenants.len(), 1);
        assert_eq!(
            directory.grants.get(&IdentityId(id)).map(|g| g.len()),
            Some(2)
        );
    }
}
