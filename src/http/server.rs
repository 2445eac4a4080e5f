//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeout, body limit, metrics)
//! - Wrap routes in the gatekeeper stages
//! - Bind server to listener with peer address info for the rate limiter
//! - Stop accepting on the shared shutdown signal

use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::{self, EndpointCatalog};
use crate::audit::AuditHandle;
use crate::authz::{BranchAuthorizer, SchemaAccessValidator, SchemaWhitelist};
use crate::config::GateConfig;
use crate::directory::Collaborators;
use crate::http::middleware::apply_gatekeeper;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::metrics;
use crate::security::headers::ClientIpResolver;
use crate::security::rate_limit::{RateLimiter, RouteClassifier};

/// Application state injected into middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub collaborators: Collaborators,
    pub limiter: Arc<RateLimiter>,
    pub classifier: Arc<RouteClassifier>,
    pub client_ip: Arc<ClientIpResolver>,
    pub schema_access: Arc<SchemaAccessValidator>,
    pub branches: Arc<BranchAuthorizer>,
    pub endpoints: Arc<EndpointCatalog>,
    pub audit: AuditHandle,
}

impl AppState {
    /// Build shared state from validated configuration.
    pub fn new(config: GateConfig, collaborators: Collaborators, audit: AuditHandle) -> Self {
        let whitelist = Arc::new(SchemaWhitelist::new(config.tenancy.schema_whitelist.iter()));
        let schema_access = Arc::new(SchemaAccessValidator::new(
            whitelist,
            collaborators.profiles.clone(),
            collaborators.tenants.clone(),
        ));
        let branches = Arc::new(BranchAuthorizer::new(collaborators.grants.clone()));

        Self {
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            classifier: Arc::new(RouteClassifier::from_config(&config.rate_limit)),
            client_ip: Arc::new(ClientIpResolver::new(
                config.security.trusted_proxies.iter().copied(),
            )),
            endpoints: Arc::new(EndpointCatalog::new(&config.endpoints)),
            schema_access,
            branches,
            collaborators,
            audit,
            config: Arc::new(config),
        }
    }
}

/// HTTP server for the gate.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let timeout = Duration::from_secs(state.config.timeouts.request_secs);
        let max_body = state.config.security.max_body_size;

        let routes = api::router().with_state(state.clone());
        apply_gatekeeper(routes, state)
            .layer(middleware::from_fn(record_metrics))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(TimeoutLayer::new(timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn record_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
