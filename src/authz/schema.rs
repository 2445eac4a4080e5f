//! Tenant schema access checks.
//!
//! # Decision Order
//! ```text
//! schema not whitelisted                  → deny (no lookup)
//! profile missing / lookup failed         → deny
//! superadmin + can_switch_tenants         → allow iff an active tenant owns the schema
//! profile.tenant_id set                   → allow iff that tenant's schema matches
//! otherwise                               → deny
//! ```
//!
//! # Design Decisions
//! - Sole tenant-isolation boundary; every handler taking a schema calls it
//! - Fail closed: collaborator errors are logged and treated as denial
//! - Callers only see a bool, so denial reasons cannot leak to clients

use std::sync::Arc;

use crate::authz::whitelist::SchemaWhitelist;
use crate::directory::{ProfileStore, TenantDirectory};
use crate::model::Identity;
use crate::observability::metrics;

/// Resolves whether an identity may operate on a tenant schema.
pub struct SchemaAccessValidator {
    whitelist: Arc<SchemaWhitelist>,
    profiles: Arc<dyn ProfileStore>,
    tenants: Arc<dyn TenantDirectory>,
}

impl SchemaAccessValidator {
    pub fn new(
        whitelist: Arc<SchemaWhitelist>,
        profiles: Arc<dyn ProfileStore>,
        tenants: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self {
            whitelist,
            profiles,
            tenants,
        }
    }

    /// True if `identity` may use `schema`.
    pub async fn has_access(&self, identity: &Identity, schema: &str) -> bool {
        let allowed = self.evaluate(identity, schema).await;
        if !allowed {
            metrics::record_authz_denied("schema");
            tracing::warn!(user_id = %identity.id, schema = %schema, "Schema access denied");
        }
        allowed
    }

    async fn evaluate(&self, identity: &Identity, schema: &str) -> bool {
        if !self.whitelist.contains(schema) {
            return false;
        }

        let profile = match self.profiles.get_profile(identity.id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(user_id = %identity.id, error = %e, "Profile lookup failed");
                return false;
            }
        };

        if profile.is_tenant_switcher() {
            return match self.tenants.find_tenant_by_schema(schema).await {
                Ok(Some(tenant)) => tenant.is_active && tenant.schema_name == schema,
                Ok(None) => false,
                Err(e) => {
                    tracing::error!(schema = %schema, error = %e, "Tenant lookup by schema failed");
                    false
                }
            };
        }

        let Some(tenant_id) = profile.tenant_id else {
            return false;
        };

        match self.tenants.find_tenant_by_id(tenant_id).await {
            Ok(Some(tenant)) => tenant.schema_name == schema,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Tenant lookup by id failed");
                false
            }
        }
    }
}
