//! Domain types shared by the access-control layer.
//!
//! Everything here is read-only input to authorization decisions. Profiles,
//! tenants and branch grants are owned by external stores; this crate only
//! reads them, once per decision.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Stable id of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable id of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated user handle, produced by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    #[serde(default)]
    pub email: Option<String>,
}

/// User role, ordered by privilege (`Viewer < User < Admin < Superadmin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    User,
    Admin,
    Superadmin,
}

impl Role {
    /// True if this role is at least as privileged as `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

/// Per-identity authorization profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub role: Role,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub can_switch_tenants: bool,
}

impl Profile {
    /// Superadmins with the switch flag may reach any active tenant.
    pub fn is_tenant_switcher(&self) -> bool {
        self.role == Role::Superadmin && self.can_switch_tenants
    }
}

/// A tenant and its data-namespace identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub schema_name: String,
    pub is_active: bool,
}

/// Code of a physical business location (filial).
///
/// Ordering: numeric codes compare numerically and sort before non-numeric
/// codes; everything else compares as text. Numerically equal codes with
/// different spellings (`"01"`, `"1"`) fall back to text order so `Ord`
/// stays consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchCode(String);

impl BranchCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for BranchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BranchCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl Ord for BranchCode {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for BranchCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
