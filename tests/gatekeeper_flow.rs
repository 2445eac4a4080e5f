//! End-to-end gatekeeper behaviour: CSRF, rate limiting, session refresh
//! and page guards, driven through the fully layered router.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, StatusCode},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tenant_gate::config::{ProtectedPrefix, QuotaConfig};
use tenant_gate::directory::{DirectoryError, SessionCookies, SessionOutcome, SessionProvider};
use tenant_gate::model::{Identity, IdentityId, Role};
use tenant_gate::{AppState, HttpServer, Shutdown};

mod common;
use common::{get, json_body, post_json, request, test_config, Fixture, GATE_HOST};

struct CookieIssuingSessions {
    identity: Identity,
}

#[async_trait]
impl SessionProvider for CookieIssuingSessions {
    async fn refresh(&self, _cookies: &SessionCookies) -> Result<SessionOutcome, DirectoryError> {
        Ok(SessionOutcome {
            identity: Some(self.identity.clone()),
            set_cookies: vec![
                "sb-access-token=fresh; Path=/; HttpOnly".into(),
                "sb-refresh-token=next; Path=/; HttpOnly".into(),
            ],
        })
    }
}

struct BrokenSessions;

#[async_trait]
impl SessionProvider for BrokenSessions {
    async fn refresh(&self, _cookies: &SessionCookies) -> Result<SessionOutcome, DirectoryError> {
        Err(DirectoryError::Transport("auth service unreachable".into()))
    }
}

#[tokio::test]
async fn test_cross_origin_post_rejected_before_any_lookup() {
    let f = Fixture::new();
    let (_, token) = f.tenant_user(Role::User);

    let req = request(Method::POST, "/api/operations/close-register")
        .header("origin", "https://evil.example")
        .header("cookie", format!("sb-access-token={token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "schema": "okilao" }).to_string()))
        .unwrap();
    let response = f.send(req).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await, json!({ "error": "Invalid request origin" }));
    assert_eq!(f.directory.counts.sessions.load(Ordering::SeqCst), 0);
    assert!(f.directory.recorded_calls().is_empty());
}

#[tokio::test]
async fn test_same_origin_and_originless_posts_pass_csrf() {
    let f = Fixture::new();
    let (_, token) = f.tenant_user(Role::User);
    let body = json!({ "schema": "okilao", "filial": "1" });

    let same_origin = request(Method::POST, "/api/operations/close-register")
        .header("origin", format!("https://{GATE_HOST}"))
        .header("cookie", format!("sb-access-token={token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    assert_eq!(f.send(same_origin).await.status(), StatusCode::OK);

    let originless = post_json("/api/operations/close-register", Some(&token), &body);
    assert_eq!(f.send(originless).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cross_origin_get_is_not_a_csrf_concern() {
    let f = Fixture::new();
    let req = request(Method::GET, "/healthz")
        .header("origin", "https://evil.example")
        .body(Body::empty())
        .unwrap();
    assert_eq!(f.send(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_can_be_disabled() {
    let mut config = test_config();
    config.security.csrf_enabled = false;
    let f = Fixture::with_config(config);

    let req = request(Method::POST, "/api/operations/close-register")
        .header("origin", "https://evil.example")
        .body(Body::empty())
        .unwrap();
    assert_eq!(f.send(req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_quota_exhaustion_returns_429_with_headers() {
    let mut config = test_config();
    config.rate_limit.auth = QuotaConfig {
        limit: 3,
        window_secs: 60,
    };
    let f = Fixture::with_config(config);

    for _ in 0..3 {
        let response = f.send(get("/api/auth/login", None)).await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    }

    let response = f.send(get("/api/auth/login", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = response.headers().clone();
    assert_eq!(headers["x-ratelimit-limit"], "3");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Too many requests. Please try again later." })
    );

    // The rejected request never reached the session stage.
    assert_eq!(f.directory.counts.sessions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_quota_is_per_client_and_ignores_untrusted_forwarding_headers() {
    let mut config = test_config();
    config.rate_limit.auth = QuotaConfig {
        limit: 1,
        window_secs: 60,
    };
    let f = Fixture::with_config(config);

    assert_ne!(f.send(get("/login", None)).await.status(), StatusCode::TOO_MANY_REQUESTS);

    let spoofed = request(Method::GET, "/login")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::empty())
        .unwrap();
    assert_eq!(f.send(spoofed).await.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_peer: SocketAddr = "203.0.113.99:40000".parse().unwrap();
    let other = axum::http::Request::builder()
        .uri("/login")
        .header("host", GATE_HOST)
        .extension(ConnectInfo(other_peer))
        .body(Body::empty())
        .unwrap();
    assert_ne!(f.send(other).await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_categories_are_counted_separately() {
    let mut config = test_config();
    config.rate_limit.auth = QuotaConfig {
        limit: 1,
        window_secs: 60,
    };
    config.rate_limit.standard = QuotaConfig {
        limit: 2,
        window_secs: 60,
    };
    let f = Fixture::with_config(config);

    assert_ne!(f.send(get("/login", None)).await.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(f.send(get("/login", None)).await.status(), StatusCode::TOO_MANY_REQUESTS);

    let standard = f.send(get("/api/branches?schema=okilao", None)).await;
    assert_eq!(standard.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(standard.headers()["x-ratelimit-limit"], "2");
}

#[tokio::test]
async fn test_health_endpoint_is_exempt() {
    let mut config = test_config();
    config.rate_limit.standard = QuotaConfig {
        limit: 1,
        window_secs: 60,
    };
    let f = Fixture::with_config(config);

    for _ in 0..5 {
        let response = f.send(get("/healthz", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_page_without_session_redirects_to_login() {
    let f = Fixture::new();
    let response = f.send(get("/dashboard", None)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn test_public_pages_need_no_session() {
    let f = Fixture::new();
    let response = f.send(get("/login", None)).await;
    assert_ne!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_api_without_session_gets_401_not_redirect() {
    let f = Fixture::new();
    let response = f.send(get("/api/branches?schema=okilao", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_role_gated_pages() {
    let f = Fixture::new();
    let (_, user) = f.tenant_user(Role::User);
    let (_, admin) = f.tenant_user(Role::Admin);
    let (_, root) = f.switching_superadmin();

    let response = f.send(get("/admin/tenants", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");

    let response = f.send(get("/admin", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let response = f.send(get("/settings/users", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = f.send(get("/admin/tenants", Some(&root))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Ungated pages only need a session.
    let response = f.send(get("/dashboard", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_gated_api_prefix_answers_403() {
    let mut config = test_config();
    config.session.protected_prefixes.push(ProtectedPrefix {
        prefix: "/api/reports".into(),
        min_role: Role::Admin,
    });
    let f = Fixture::with_config(config);
    let (_, user) = f.tenant_user(Role::User);
    let (_, admin) = f.tenant_user(Role::Admin);

    let response = f.send(get("/api/reports/sales?schema=okilao", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await, json!({ "error": "Forbidden" }));
    assert!(f.directory.recorded_calls().is_empty());

    let response = f.send(get("/api/reports/sales?schema=okilao", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Ungated API paths and anonymous callers are unaffected.
    let response = f.send(get("/api/branches?schema=okilao", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = f.send(get("/api/reports/sales?schema=okilao", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refreshed_session_cookies_reach_the_client() {
    let identity = Identity {
        id: IdentityId(uuid::Uuid::new_v4()),
        email: None,
    };
    let sessions = Arc::new(CookieIssuingSessions {
        identity: identity.clone(),
    });
    let f = Fixture::custom(test_config(), |c| c.sessions = sessions);
    f.directory.insert_profile(
        identity.id,
        tenant_gate::model::Profile {
            role: Role::User,
            tenant_id: Some(f.okilao),
            can_switch_tenants: false,
        },
    );

    let response = f.send(get("/api/branches?schema=okilao", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("sb-access-token=fresh"));
}

#[tokio::test]
async fn test_session_provider_failure_means_no_identity() {
    let f = Fixture::custom(test_config(), |c| c.sessions = Arc::new(BrokenSessions));

    let page = f.send(get("/dashboard", Some("anything"))).await;
    assert_eq!(page.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(page.headers()[header::LOCATION], "/login");

    let api = f.send(get("/api/branches?schema=okilao", Some("anything"))).await;
    assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_is_assigned() {
    let f = Fixture::new();
    let response = f.send(get("/healthz", None)).await;
    assert!(response.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn test_live_server_serves_and_stops_on_shutdown() {
    let f = Fixture::new();
    let state: AppState = f.state.clone();
    let shutdown = Shutdown::new();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(state);
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .expect("gate unreachable");
    assert_eq!(res.status(), 200);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
