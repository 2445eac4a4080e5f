//! Branch-level data authorization.
//!
//! # Rules
//! ```text
//! grants = []          → Unrestricted
//! grants = [B1, ...]   → Restricted({B1, ...})
//!
//! multi-branch (reconcile):
//!   Unrestricted, any request        → request unchanged
//!   Restricted(S), "all"             → S
//!   Restricted(S), list L            → L ∩ S, or S when empty
//!
//! single-branch (narrow_single):
//!   Unrestricted, any request        → request unchanged (lowest code of a list)
//!   Restricted(S), code ∈ S          → code
//!   Restricted(S), otherwise         → first(S)
//! ```
//!
//! # Design Decisions
//! - Restriction is opt-in per user; no grants means no filtering
//! - Never degrade to zero branches; fall back to everything allowed
//! - "First" follows the `BranchCode` ordering, not storage order
//! - Lookup failures are errors, never an implicit `Unrestricted`

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::directory::{BranchGrants, DirectoryError};
use crate::model::{BranchCode, Identity};

/// The branches an identity may query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizedBranches {
    Unrestricted,
    /// Never empty.
    Restricted(BTreeSet<BranchCode>),
}

impl AuthorizedBranches {
    /// Build from grant rows; no rows means unrestricted.
    pub fn from_grants(grants: impl IntoIterator<Item = BranchCode>) -> Self {
        let set: BTreeSet<BranchCode> = grants.into_iter().collect();
        if set.is_empty() {
            Self::Unrestricted
        } else {
            Self::Restricted(set)
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::Restricted(_))
    }

    pub fn allows(&self, code: &BranchCode) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Restricted(set) => set.contains(code),
        }
    }
}

/// A caller's requested branch filter (`"all"` or `"1,2,3"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchRequest {
    All,
    Codes(Vec<BranchCode>),
}

impl BranchRequest {
    /// Parse a raw request value. Missing, blank and `all` mean every branch.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim) else {
            return Self::All;
        };
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        let codes: Vec<BranchCode> = raw
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(BranchCode::from)
            .collect();
        if codes.is_empty() {
            Self::All
        } else {
            Self::Codes(codes)
        }
    }
}

/// Effective filter for a multi-branch query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchFilter {
    All,
    Codes(Vec<BranchCode>),
}

impl BranchFilter {
    /// Render for the backend: `"all"` or a comma-joined list.
    pub fn to_param(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Codes(codes) => codes
                .iter()
                .map(BranchCode::as_str)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Effective branch for a single-branch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSelection {
    All,
    One(BranchCode),
}

impl BranchSelection {
    pub fn to_param(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::One(code) => code.to_string(),
        }
    }
}

/// Combine the authorized set with a multi-branch request.
pub fn reconcile(authorized: &AuthorizedBranches, request: &BranchRequest) -> BranchFilter {
    let allowed = match authorized {
        AuthorizedBranches::Unrestricted => {
            return match request {
                BranchRequest::All => BranchFilter::All,
                BranchRequest::Codes(codes) => BranchFilter::Codes(codes.clone()),
            };
        }
        AuthorizedBranches::Restricted(allowed) => allowed,
    };

    let everything = || BranchFilter::Codes(allowed.iter().cloned().collect());
    match request {
        BranchRequest::All => everything(),
        BranchRequest::Codes(codes) => {
            let permitted: BTreeSet<BranchCode> = codes
                .iter()
                .filter(|code| allowed.contains(*code))
                .cloned()
                .collect();
            if permitted.is_empty() {
                everything()
            } else {
                BranchFilter::Codes(permitted.into_iter().collect())
            }
        }
    }
}

/// Narrow a request to a single branch the identity may use.
///
/// A multi-code request resolves to its lowest authorized code.
pub fn narrow_single(authorized: &AuthorizedBranches, request: &BranchRequest) -> BranchSelection {
    let allowed = match authorized {
        AuthorizedBranches::Unrestricted => {
            return match request {
                BranchRequest::Codes(codes) => match codes.iter().min() {
                    Some(code) => BranchSelection::One(code.clone()),
                    None => BranchSelection::All,
                },
                BranchRequest::All => BranchSelection::All,
            };
        }
        AuthorizedBranches::Restricted(allowed) => allowed,
    };

    let requested = match request {
        BranchRequest::Codes(codes) => codes.iter().filter(|c| allowed.contains(*c)).min(),
        BranchRequest::All => None,
    };

    match requested.or_else(|| allowed.iter().next()) {
        Some(code) => BranchSelection::One(code.clone()),
        None => BranchSelection::All,
    }
}

/// Loads branch grants for an identity.
pub struct BranchAuthorizer {
    grants: Arc<dyn BranchGrants>,
}

impl BranchAuthorizer {
    pub fn new(grants: Arc<dyn BranchGrants>) -> Self {
        Self { grants }
    }

    /// Branches `identity` may query, fetched fresh.
    pub async fn authorized_branches(
        &self,
        identity: &Identity,
    ) -> Result<AuthorizedBranches, DirectoryError> {
        let grants = self.grants.get_branch_grants(identity.id).await?;
        Ok(AuthorizedBranches::from_grants(grants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::model::IdentityId;
    use uuid::Uuid;

    fn codes(list: &[&str]) -> Vec<BranchCode> {
        list.iter().map(|c| BranchCode::from(*c)).collect()
    }

    fn restricted(list: &[&str]) -> AuthorizedBranches {
        AuthorizedBranches::from_grants(codes(list))
    }

    #[test]
    fn test_parse_request() {
        assert_eq!(BranchRequest::parse(None), BranchRequest::All);
        assert_eq!(BranchRequest::parse(Some("all")), BranchRequest::All);
        assert_eq!(BranchRequest::parse(Some("ALL")), BranchRequest::All);
        assert_eq!(BranchRequest::parse(Some("  ")), BranchRequest::All);
        assert_eq!(BranchRequest::parse(Some(" , ")), BranchRequest::All);
        assert_eq!(
            BranchRequest::parse(Some("1, 3,,7")),
            BranchRequest::Codes(codes(&["1", "3", "7"]))
        );
    }

    #[test]
    fn test_empty_grants_unrestricted() {
        assert_eq!(AuthorizedBranches::from_grants(vec![]), AuthorizedBranches::Unrestricted);
    }

    #[test]
    fn test_unrestricted_passes_request_through() {
        let all = reconcile(&AuthorizedBranches::Unrestricted, &BranchRequest::All);
        assert_eq!(all, BranchFilter::All);
        assert_eq!(all.to_param(), "all");

        let list = reconcile(
            &AuthorizedBranches::Unrestricted,
            &BranchRequest::Codes(codes(&["9", "4"])),
        );
        assert_eq!(list.to_param(), "9,4");
    }

    #[test]
    fn test_restricted_all_expands_to_grants() {
        let filter = reconcile(&restricted(&["2", "1"]), &BranchRequest::All);
        assert_eq!(filter, BranchFilter::Codes(codes(&["1", "2"])));
    }

    #[test]
    fn test_restricted_list_intersects() {
        let filter = reconcile(
            &restricted(&["1", "2", "5"]),
            &BranchRequest::Codes(codes(&["5", "3", "1"])),
        );
        assert_eq!(filter.to_param(), "1,5");
    }

    #[test]
    fn test_restricted_unauthorized_request_falls_back() {
        let filter = reconcile(
            &restricted(&["B1", "B2"]),
            &BranchRequest::Codes(codes(&["B3"])),
        );
        assert_eq!(filter, BranchFilter::Codes(codes(&["B1", "B2"])));
    }

    #[test]
    fn test_single_branch_narrowing() {
        let auth = restricted(&["7", "3"]);

        assert_eq!(
            narrow_single(&auth, &BranchRequest::Codes(codes(&["7"]))),
            BranchSelection::One("7".into())
        );
        assert_eq!(
            narrow_single(&auth, &BranchRequest::Codes(codes(&["9"]))),
            BranchSelection::One("3".into())
        );
        assert_eq!(
            narrow_single(&auth, &BranchRequest::All),
            BranchSelection::One("3".into())
        );
    }

    #[test]
    fn test_single_branch_first_is_stable() {
        let auth = restricted(&["10", "2", "33"]);
        for _ in 0..5 {
            assert_eq!(
                narrow_single(&auth, &BranchRequest::All),
                BranchSelection::One("2".into())
            );
        }
    }

    #[test]
    fn test_single_branch_unrestricted_passthrough() {
        assert_eq!(
            narrow_single(&AuthorizedBranches::Unrestricted, &BranchRequest::All),
            BranchSelection::All
        );
        assert_eq!(
            narrow_single(
                &AuthorizedBranches::Unrestricted,
                &BranchRequest::Codes(codes(&["12"]))
            )
            .to_param(),
            "12"
        );
    }

    #[tokio::test]
    async fn test_authorizer_reads_grants() {
        let directory = Arc::new(MemoryDirectory::new("sb-access-token"));
        let identity = Identity {
            id: IdentityId(Uuid::new_v4()),
            email: None,
        };
        let authorizer = BranchAuthorizer::new(directory.clone());

        assert_eq!(
            authorizer.authorized_branches(&identity).await.unwrap(),
            AuthorizedBranches::Unrestricted
        );

        directory.set_grants(identity.id, codes(&["4", "1"]));
        let branches = authorizer.authorized_branches(&identity).await.unwrap();
        assert!(branches.allows(&"4".into()));
        assert!(!branches.allows(&"2".into()));
    }

    #[tokio::test]
    async fn test_authorizer_lookup_failure_is_error() {
        let directory = Arc::new(MemoryDirectory::new("sb-access-token"));
        directory.set_fail_lookups(true);
        let authorizer = BranchAuthorizer::new(directory);
        let identity = Identity {
            id: IdentityId(Uuid::new_v4()),
            email: None,
        };
        assert!(authorizer.authorized_branches(&identity).await.is_err());
    }
}
