//! Client identification from connection and proxy headers.
//!
//! # Precedence
//! ```text
//! peer is a trusted proxy:   X-Forwarded-For (first valid IP) → X-Real-IP → peer IP
//! peer is not trusted:       peer IP
//! no peer address:           "unknown"
//! ```
//!
//! # Design Decisions
//! - Never trust X-Forwarded-* from untrusted sources
//! - Configurable trusted proxy list for header trust

use axum::http::HeaderMap;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Identifier used when neither headers nor the connection yield an address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derives the rate-limit client identifier for a request.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: HashSet<IpAddr>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            trusted_proxies: trusted_proxies.into_iter().collect(),
        }
    }

    /// Resolve the client identifier.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let Some(peer) = peer else {
            return UNKNOWN_CLIENT.to_string();
        };

        if self.trusted_proxies.contains(&peer.ip()) {
            if let Some(ip) = forwarded_for(headers).or_else(|| real_ip(headers)) {
                return ip.to_string();
            }
        }

        peer.ip().to_string()
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .and_then(|first| first.trim().parse().ok())
}

fn real_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}
