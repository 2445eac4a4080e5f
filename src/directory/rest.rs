//! Managed backend adapter (PostgREST data API + GoTrue auth API).
//!
//! # Endpoints
//! ```text
//! GET  auth/v1/user                              session check (access token)
//! POST auth/v1/token?grant_type=refresh_token    session refresh, re-issues cookies
//! GET  rest/v1/user_profiles?id=eq.<id>
//! GET  rest/v1/tenants?schema_name=eq.<s> | id=eq.<id>
//! GET  rest/v1/user_authorized_branches?user_id=eq.<id>
//! POST rest/v1/rpc/<operation>                   Content-Profile/Accept-Profile: <schema>
//! POST rest/v1/audit_logs
//! ```
//!
//! Table reads use the service key. The user's own access token is only
//! used to resolve the session.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{
    AuditEvent, AuditSink, BackendError, BranchGrants, DataBackend, DirectoryError, ProfileStore,
    SessionCookies, SessionOutcome, SessionProvider, TenantDirectory,
};
use crate::config::{BackendConfig, SessionConfig};
use crate::model::{BranchCode, Identity, IdentityId, Profile, Tenant, TenantId};

const APIKEY_HEADER: &str = "apikey";
const CONTENT_PROFILE_HEADER: &str = "Content-Profile";
const ACCEPT_PROFILE_HEADER: &str = "Accept-Profile";

const PROFILE_COLUMNS: &str = "role,tenant_id,can_switch_tenants";
const TENANT_COLUMNS: &str = "id,schema_name,is_active";

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: IdentityId,
    #[serde(default)]
    email: Option<String>,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Identity {
            id: user.id,
            email: user.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct GrantRow {
    branch_code: BranchCode,
}

/// Collaborator implementation backed by the managed backend's HTTP APIs.
pub struct RestDirectory {
    client: Client,
    base_url: Url,
    service_key: String,
    access_cookie: String,
    refresh_cookie: String,
    cookie_max_age_secs: u64,
    secure_cookies: bool,
}

impl RestDirectory {
    pub fn new(backend: &BackendConfig, session: &SessionConfig) -> Result<Self, DirectoryError> {
        let mut base_url = Url::parse(&backend.url)
            .map_err(|e| DirectoryError::Transport(format!("invalid backend url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(backend.timeout_secs))
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            service_key: backend.service_key.clone(),
            access_cookie: session.access_cookie.clone(),
            refresh_cookie: session.refresh_cookie.clone(),
            cookie_max_age_secs: session.cookie_max_age_secs,
            secure_cookies: session.secure_cookies,
        })
    }

    fn url(&self, path: &str) -> Result<Url, DirectoryError> {
        self.base_url
            .join(path)
            .map_err(|e| DirectoryError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(APIKEY_HEADER, &self.service_key)
    }

    fn service_request(&self, method: Method, path: &str) -> Result<RequestBuilder, DirectoryError> {
        Ok(self
            .request(method, self.url(path)?)
            .bearer_auth(&self.service_key))
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, DirectoryError> {
        let response = self
            .service_request(Method::GET, &format!("rest/v1/{table}"))?
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    fn session_cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn cleared_cookies(&self) -> Vec<String> {
        vec![
            self.session_cookie(&self.access_cookie, "", 0),
            self.session_cookie(&self.refresh_cookie, "", 0),
        ]
    }

    /// `Ok(None)` when the token is rejected.
    async fn current_user(&self, access_token: &str) -> Result<Option<Identity>, DirectoryError> {
        let response = self
            .request(Method::GET, self.url("auth/v1/user")?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| DirectoryError::Decode(e.to_string()))?;
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(DirectoryError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionOutcome, DirectoryError> {
        let mut url = self.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .request(Method::POST, url)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            tracing::debug!(status = status.as_u16(), "Refresh token rejected; clearing session cookies");
            return Ok(SessionOutcome {
                identity: None,
                set_cookies: self.cleared_cookies(),
            });
        }
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        Ok(SessionOutcome {
            set_cookies: vec![
                self.session_cookie(&self.access_cookie, &grant.access_token, self.cookie_max_age_secs),
                self.session_cookie(&self.refresh_cookie, &grant.refresh_token, self.cookie_max_age_secs),
            ],
            identity: Some(grant.user.into()),
        })
    }
}

#[async_trait]
impl SessionProvider for RestDirectory {
    async fn refresh(&self, cookies: &SessionCookies) -> Result<SessionOutcome, DirectoryError> {
        if let Some(token) = cookies.get(&self.access_cookie).filter(|t| !t.is_empty()) {
            if let Some(identity) = self.current_user(token).await? {
                return Ok(SessionOutcome {
                    identity: Some(identity),
                    set_cookies: Vec::new(),
                });
            }
        }

        match cookies.get(&self.refresh_cookie).filter(|t| !t.is_empty()) {
            Some(token) => self.refresh_session(token).await,
            None => Ok(SessionOutcome::default()),
        }
    }
}

#[async_trait]
impl ProfileStore for RestDirectory {
    async fn get_profile(&self, id: IdentityId) -> Result<Option<Profile>, DirectoryError> {
        let rows: Vec<Profile> = self
            .fetch_rows(
                "user_profiles",
                &[("id", format!("eq.{id}")), ("select", PROFILE_COLUMNS.to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl TenantDirectory for RestDirectory {
    async fn find_tenant_by_schema(&self, schema: &str) -> Result<Option<Tenant>, DirectoryError> {
        let rows: Vec<Tenant> = self
            .fetch_rows(
                "tenants",
                &[
                    ("schema_name", format!("eq.{schema}")),
                    ("select", TENANT_COLUMNS.to_string()),
                ],
            )
            .await?;
        let mut rows = rows.into_iter();
        let first = rows.next();
        Ok(match first {
            Some(tenant) if !tenant.is_active => rows.find(|t| t.is_active).or(Some(tenant)),
            other => other,
        })
    }

    async fn find_tenant_by_id(&self, id: TenantId) -> Result<Option<Tenant>, DirectoryError> {
        let rows: Vec<Tenant> = self
            .fetch_rows(
                "tenants",
                &[("id", format!("eq.{id}")), ("select", TENANT_COLUMNS.to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl BranchGrants for RestDirectory {
    async fn get_branch_grants(&self, id: IdentityId) -> Result<Vec<BranchCode>, DirectoryError> {
        let rows: Vec<GrantRow> = self
            .fetch_rows(
                "user_authorized_branches",
                &[("user_id", format!("eq.{id}")), ("select", "branch_code".to_string())],
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.branch_code).collect())
    }
}

#[async_trait]
impl DataBackend for RestDirectory {
    async fn call(
        &self,
        schema: &str,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let url = self
            .url(&format!("rest/v1/rpc/{operation}"))
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let response = self
            .request(Method::POST, url)
            .bearer_auth(&self.service_key)
            .header(CONTENT_PROFILE_HEADER, schema)
            .header(ACCEPT_PROFILE_HEADER, schema)
            .json(&params)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(serde_json::Value::Null);
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AuditSink for RestDirectory {
    async fn record(&self, event: AuditEvent) -> Result<(), DirectoryError> {
        let response = self
            .service_request(Method::POST, "rest/v1/audit_logs")?
            .header("Prefer", "return=minimal")
            .json(&event)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
