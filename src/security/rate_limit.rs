//! Fixed-window rate limiting per route category and client.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{QuotaConfig, RateLimitConfig};
use crate::error::ApiError;
use crate::http::request::matches_prefix;
use crate::http::server::AppState;
use crate::observability::metrics;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Request classification, each with its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateCategory {
    Auth,
    Reports,
    Standard,
}

impl RateCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RateCategory::Auth => "auth",
            RateCategory::Reports => "reports",
            RateCategory::Standard => "standard",
        }
    }
}

/// Requests allowed per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl From<QuotaConfig> for Quota {
    fn from(config: QuotaConfig) -> Self {
        Self {
            limit: config.limit,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_secs: u64,
}

/// Counter for one `(category, client)` key.
#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Whole seconds, rounded up, never zero.
fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// Fixed-window limiter keyed by category and client identifier.
///
/// Each key's read-modify-write runs under its DashMap shard lock, so
/// concurrent requests on the same key never lose an increment.
pub struct RateLimiter {
    windows: DashMap<(RateCategory, String), Window>,
    auth: Quota,
    reports: Quota,
    standard: Quota,
}

impl RateLimiter {
    pub fn new(auth: Quota, reports: Quota, standard: Quota) -> Self {
        Self {
            windows: DashMap::new(),
            auth,
            reports,
            standard,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.auth.into(), config.reports.into(), config.standard.into())
    }

    pub fn quota(&self, category: RateCategory) -> Quota {
        match category {
            RateCategory::Auth => self.auth,
            RateCategory::Reports => self.reports,
            RateCategory::Standard => self.standard,
        }
    }

    /// Count a request for `client` in `category`.
    pub fn check(&self, category: RateCategory, client: &str) -> RateDecision {
        self.check_at(category, client, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, category: RateCategory, client: &str, now: Instant) -> RateDecision {
        let quota = self.quota(category);
        let mut entry = self
            .windows
            .entry((category, client.to_string()))
            .or_insert_with(|| Window { count: 0, started: now });
        let window = entry.value_mut();

        if window.count == 0 || now.saturating_duration_since(window.started) >= quota.window {
            window.started = now;
            window.count = 0;
        }

        let reset_in_secs =
            ceil_secs(quota.window.saturating_sub(now.saturating_duration_since(window.started)));

        if window.count >= quota.limit {
            // Saturate so a denied client cannot grow the counter.
            window.count = quota.limit.saturating_add(1);
            return RateDecision {
                allowed: false,
                limit: quota.limit,
                remaining: 0,
                reset_in_secs,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            limit: quota.limit,
            remaining: quota.limit - window.count,
            reset_in_secs,
        }
    }

    /// Drop every expired window. Returns the number of live windows.
    pub fn sweep_at(&self, now: Instant) -> usize {
        self.windows.retain(|(category, _), window| {
            now.saturating_duration_since(window.started) < self.quota(*category).window
        });
        self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Periodically evict expired windows until shutdown.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let live = self.sweep_at(Instant::now());
                        metrics::record_rate_limit_windows(live);
                        tracing::debug!(live_windows = live, "Rate-limit sweep complete");
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Rate-limit sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

/// Maps request paths to rate-limit categories.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    auth_prefixes: Vec<String>,
    reports_prefixes: Vec<String>,
    exempt_paths: Vec<String>,
}

impl RouteClassifier {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            auth_prefixes: config.auth_prefixes.clone(),
            reports_prefixes: config.reports_prefixes.clone(),
            exempt_paths: config.exempt_paths.clone(),
        }
    }

    /// Category for `path`, or `None` if the path is exempt.
    pub fn classify(&self, path: &str) -> Option<RateCategory> {
        if self.exempt_paths.iter().any(|p| p == path) {
            return None;
        }
        if self.auth_prefixes.iter().any(|p| matches_prefix(path, p)) {
            return Some(RateCategory::Auth);
        }
        if self.reports_prefixes.iter().any(|p| matches_prefix(path, p)) {
            return Some(RateCategory::Reports);
        }
        Some(RateCategory::Standard)
    }
}

fn header_value(value: impl ToString) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Middleware enforcing the per-category quota for the client.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let Some(category) = state.classifier.classify(request.uri().path()) else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = state.client_ip.resolve(request.headers(), peer);
    let decision = state.limiter.check(category, &client);

    if !decision.allowed {
        tracing::warn!(
            client = %client,
            category = category.as_str(),
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(category.as_str());

        let mut response = ApiError::RateLimited.into_response();
        let headers = response.headers_mut();
        headers.insert(axum::http::header::RETRY_AFTER, header_value(decision.reset_in_secs));
        headers.insert(X_RATELIMIT_LIMIT, header_value(decision.limit));
        headers.insert(X_RATELIMIT_REMAINING, header_value(0));
        headers.insert(X_RATELIMIT_RESET, header_value(decision.reset_in_secs));
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, header_value(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, header_value(decision.remaining));
    response
}
