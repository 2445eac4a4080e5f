//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

use tenant_gate::audit::spawn_audit_worker;
use tenant_gate::config::{EndpointConfig, EndpointScope, GateConfig};
use tenant_gate::directory::{AuditEvent, Collaborators, MemoryDirectory};
use tenant_gate::model::{Identity, IdentityId, Profile, Role, Tenant, TenantId};
use tenant_gate::{AppState, HttpServer, Shutdown};

pub const SESSION_COOKIE: &str = "sb-access-token";
pub const GATE_HOST: &str = "gate.example";

/// Default client address for in-process requests.
pub fn peer() -> SocketAddr {
    "203.0.113.10:51000".parse().unwrap()
}

/// Configuration used by most tests: two catalog endpoints, insecure cookies.
pub fn test_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.session.secure_cookies = false;
    config.endpoints = vec![
        EndpointConfig {
            slug: "sales".into(),
            operation: "get_sales_by_branch".into(),
            scope: EndpointScope::MultiBranch,
        },
        EndpointConfig {
            slug: "close-register".into(),
            operation: "close_cash_register".into(),
            scope: EndpointScope::SingleBranch,
        },
    ];
    config
}

pub struct Fixture {
    pub directory: Arc<MemoryDirectory>,
    pub state: AppState,
    pub router: Router,
    pub okilao: TenantId,
    pub saoluiz: TenantId,
    shutdown: Shutdown,
    audit_worker: Option<JoinHandle<()>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: GateConfig) -> Self {
        Self::custom(config, |_| {})
    }

    /// Build a fixture, letting the caller swap individual collaborators.
    pub fn custom(config: GateConfig, customize: impl FnOnce(&mut Collaborators)) -> Self {
        let directory = Arc::new(MemoryDirectory::new(SESSION_COOKIE));
        let okilao = TenantId(Uuid::new_v4());
        let saoluiz = TenantId(Uuid::new_v4());
        directory.insert_tenant(Tenant {
            id: okilao,
            schema_name: "okilao".into(),
            is_active: true,
        });
        directory.insert_tenant(Tenant {
            id: saoluiz,
            schema_name: "saoluiz".into(),
            is_active: true,
        });
        directory.insert_tenant(Tenant {
            id: TenantId(Uuid::new_v4()),
            schema_name: "paraiso".into(),
            is_active: false,
        });

        let mut collaborators = Collaborators::from_shared(directory.clone());
        customize(&mut collaborators);

        let shutdown = Shutdown::new();
        let (audit, worker) =
            spawn_audit_worker(collaborators.audit.clone(), 64, shutdown.subscribe());

        let state = AppState::new(config, collaborators, audit);
        let router = HttpServer::new(state.clone()).router();

        Self {
            directory,
            state,
            router,
            okilao,
            saoluiz,
            shutdown,
            audit_worker: Some(worker),
        }
    }

    /// Register a signed-in user; the session token is the returned cookie value.
    pub fn user(&self, profile: Profile) -> (Identity, String) {
        let identity = Identity {
            id: IdentityId(Uuid::new_v4()),
            email: Some("user@example.com".into()),
        };
        let token = format!("token-{}", identity.id);
        self.directory.insert_session(token.clone(), identity.clone());
        self.directory.insert_profile(identity.id, profile);
        (identity, token)
    }

    pub fn tenant_user(&self, role: Role) -> (Identity, String) {
        self.user(Profile {
            role,
            tenant_id: Some(self.okilao),
            can_switch_tenants: false,
        })
    }

    pub fn switching_superadmin(&self) -> (Identity, String) {
        self.user(Profile {
            role: Role::Superadmin,
            tenant_id: None,
            can_switch_tenants: true,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Stop the audit worker and return everything it delivered.
    pub async fn drain_audit(&mut self) -> Vec<AuditEvent> {
        self.shutdown.trigger();
        if let Some(worker) = self.audit_worker.take() {
            worker.await.unwrap();
        }
        self.directory.audit_events()
    }
}

/// Request builder carrying the peer address the server would attach.
pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", GATE_HOST)
        .extension(ConnectInfo(peer()))
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = request(Method::GET, uri);
    if let Some(token) = token {
        builder = builder.header("cookie", format!("{SESSION_COOKIE}={token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = request(Method::POST, uri).header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("cookie", format!("{SESSION_COOKIE}={token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
