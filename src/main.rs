//! Tenant Gate
//!
//! Access-control layer in front of a multi-tenant reporting backend.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server (request id, trace, timeout, body limit)
//!                        │
//!                        ▼
//!                     gatekeeper: CSRF ─▶ rate limit ─▶ session refresh + page guard
//!                        │
//!                        ▼
//!                     api handlers: schema access ─▶ branch resolver ─▶ data backend
//!                        │                                              │
//!                        │                                              ▼
//!                        │                                        audit queue ─▶ audit worker
//!     Client Response    ▼
//!     ◀──────────────  JSON / redirect
//!
//!     Background: rate-limit sweeper, metrics exporter, signal handler
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use tenant_gate::audit::{spawn_audit_worker, AuditHandle};
use tenant_gate::config::loader::{default_config, load_config};
use tenant_gate::config::{BackendKind, GateConfig};
use tenant_gate::directory::{Collaborators, MemoryDirectory, RestDirectory};
use tenant_gate::lifecycle::{wait_for_shutdown, Shutdown};
use tenant_gate::observability::{logging, metrics};
use tenant_gate::{AppState, HttpServer};

#[derive(Parser)]
#[command(name = "tenant-gate")]
#[command(about = "Access-control gateway for multi-tenant reporting", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn build_collaborators(config: &GateConfig) -> Result<Collaborators, Box<dyn std::error::Error>> {
    match config.backend.kind {
        BackendKind::Rest => {
            let directory = RestDirectory::new(&config.backend, &config.session)?;
            Ok(Collaborators::from_shared(Arc::new(directory)))
        }
        BackendKind::Memory => {
            let cookie = config.session.access_cookie.clone();
            let directory = match &config.backend.seed_path {
                Some(path) => MemoryDirectory::load_from_file(cookie, Path::new(path))?,
                None => MemoryDirectory::new(cookie),
            };
            tracing::warn!("Using in-memory directory; not for production");
            Ok(Collaborators::from_shared(Arc::new(directory)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!("tenant-gate v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = ?config.backend.kind,
        schemas = config.tenancy.schema_whitelist.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let collaborators = build_collaborators(&config)?;
    let shutdown = Shutdown::new();

    let (audit, audit_worker) = if config.audit.enabled {
        let (handle, worker) = spawn_audit_worker(
            collaborators.audit.clone(),
            config.audit.queue_capacity,
            shutdown.subscribe(),
        );
        (handle, Some(worker))
    } else {
        (AuditHandle::disabled(), None)
    };

    let sweep_interval = Duration::from_secs(config.rate_limit.sweep_interval_secs);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let state = AppState::new(config, collaborators, audit);
    if state.endpoints.is_empty() {
        tracing::warn!("No report or operation endpoints configured");
    } else {
        tracing::info!(endpoints = state.endpoints.len(), "Endpoint catalog loaded");
    }
    let sweeper = state
        .limiter
        .clone()
        .spawn_sweeper(sweep_interval, shutdown.subscribe());

    let server = HttpServer::new(state);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    wait_for_shutdown().await;
    shutdown.trigger();

    server_task.await??;
    let _ = sweeper.await;
    if let Some(worker) = audit_worker {
        let _ = worker.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
