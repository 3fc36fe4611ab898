use super::{app_router, AppState, RateLimiter, RouterOptions};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;
use sysmanix_core::auth::{hash_password_blocking, Credential, CredentialStore, TokenManager};
use sysmanix_core::services::ProtectedSet;
use sysmanix_core::{
    ActionOutcome, LogEntry, ServiceAction, ServiceBackend, ServiceError, ServiceInfo,
    ServiceStatus,
};
use tower::ServiceExt;

const SECRET: &str = "test-secret-test-secret-test-secret";

/// 内存后端：记录调用次数，受保护名单沿用 Linux 规则
#[derive(Default)]
struct FakeBackend {
    calls: AtomicUsize,
    last_lines: AtomicUsize,
}

impl FakeBackend {
    fn check(&self, name: &str) -> sysmanix_core::Result<()> {
        ProtectedSet::linux().check(name)
    }
}

#[async_trait]
impl ServiceBackend for FakeBackend {
    fn platform(&self) -> &'static str {
        "test"
    }

    async fn list(&self) -> sysmanix_core::Result<Vec<ServiceInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ServiceInfo {
            name: "nginx".into(),
            display_name: "nginx web server".into(),
            status: "running".into(),
            is_active: true,
            updated_at: Utc::now(),
        }])
    }

    async fn status(&self, name: &str) -> sysmanix_core::Result<ServiceStatus> {
        self.check(name)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if name == "ghost" {
            return Err(ServiceError::Adapter("service not found".into()));
        }
        Ok(ServiceStatus {
            name: name.into(),
            status: "active".into(),
            is_active: true,
            updated_at: Utc::now(),
        })
    }

    async fn start(&self, name: &str) -> sysmanix_core::Result<ActionOutcome> {
        self.check(name)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if name == "stuck" {
            return Err(ServiceError::Timeout {
                name: name.into(),
                target: "active".into(),
                last_state: "activating".into(),
            });
        }
        Ok(ActionOutcome {
            name: name.into(),
            action: ServiceAction::Start,
            changed: true,
            status: "active".into(),
        })
    }

    async fn stop(&self, name: &str) -> sysmanix_core::Result<ActionOutcome> {
        self.check(name)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ActionOutcome {
            name: name.into(),
            action: ServiceAction::Stop,
            changed: false,
            status: "inactive".into(),
        })
    }

    async fn logs(&self, name: &str, lines: usize) -> sysmanix_core::Result<Vec<LogEntry>> {
        self.check(name)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_lines.store(lines, Ordering::SeqCst);
        Ok(vec![LogEntry {
            time: "2024-01-01T00:00:00Z".into(),
            level: "info".into(),
            message: "started".into(),
        }])
    }
}

struct Harness {
    app: Router,
    tokens: Arc<TokenManager>,
    backend: Arc<FakeBackend>,
}

fn credential(password: &str, roles: &[&str]) -> Credential {
    Credential {
        password: None,
        password_hash: hash_password_blocking(password).unwrap(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

fn harness_with_limit(login_limit: usize) -> Harness {
    harness_with(login_limit, false)
}

fn harness_with(login_limit: usize, trust_proxy: bool) -> Harness {
    let tokens = Arc::new(TokenManager::new(SECRET));
    let credentials = Arc::new(
        CredentialStore::from_credentials([
            ("admin".to_string(), credential("admin-pass", &["admin"])),
            ("viewer".to_string(), credential("viewer-pass", &["viewer"])),
        ])
        .unwrap(),
    );
    let backend = Arc::new(FakeBackend::default());
    let state = AppState {
        tokens: tokens.clone(),
        credentials,
        backend: backend.clone(),
        login_limiter: Arc::new(RateLimiter::new(login_limit, Duration::from_secs(60))),
        trust_proxy,
        started_at: Utc::now(),
        system: Arc::new(Mutex::new(System::new())),
    };
    Harness {
        app: app_router(state, RouterOptions::default()),
        tokens,
        backend,
    }
}

fn harness() -> Harness {
    harness_with_limit(100)
}

fn token_for(h: &Harness, user: &str, role: &str) -> String {
    h.tokens.issue(user, &[role.to_string()]).unwrap().token
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_ok_without_auth() {
    let h = harness();
    let (status, body) = send(&h.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["platform"], "test");
    assert!(body["data"]["memory"]["rssBytes"].is_u64());
    assert!(body["data"]["memory"]["virtualBytes"].is_u64());
}

#[tokio::test]
async fn login_issues_token_with_roles() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        post("/auth/login", None, json!({"username": "admin", "password": "admin-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["roles"], json!(["admin"]));

    let token = body["data"]["token"].as_str().unwrap();
    let claims = h.tokens.validate(token).unwrap();
    assert_eq!(claims.uid, "admin");
}

#[tokio::test]
async fn login_with_wrong_password_is_401_and_issues_nothing() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        post("/auth/login", None, json!({"username": "admin", "password": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 401);
    assert!(h.tokens.list_active().is_empty());
}

#[tokio::test]
async fn login_is_rate_limited() {
    let h = harness_with_limit(2);
    for _ in 0..2 {
        let (status, _) = send(
            &h.app,
            post("/auth/login", None, json!({"username": "admin", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = send(
        &h.app,
        post("/auth/login", None, json!({"username": "admin", "password": "admin-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 429);
}

fn login_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut request = post("/auth/login", None, json!({"username": "admin", "password": "x"}));
    if let Some(ip) = forwarded_for {
        request
            .headers_mut()
            .insert("X-Forwarded-For", ip.parse().unwrap());
        request.headers_mut().insert("X-Real-IP", ip.parse().unwrap());
    }
    let peer: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

#[tokio::test]
async fn forwarded_headers_do_not_reset_login_limit() {
    let h = harness_with_limit(2);
    for spoofed in ["10.0.0.1", "10.0.0.2"] {
        let (status, _) = send(&h.app, login_from("192.0.2.7:40000", Some(spoofed))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(&h.app, login_from("192.0.2.7:40001", Some("10.0.0.3"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // 其他 socket 地址不受影响
    let (status, _) = send(&h.app, login_from("192.0.2.8:40000", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trusted_proxy_limits_per_forwarded_client() {
    let h = harness_with(1, true);
    let proxy = "127.0.0.1:50000";
    let (status, _) = send(&h.app, login_from(proxy, Some("10.0.0.1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&h.app, login_from(proxy, Some("10.0.0.1"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let (status, _) = send(&h.app, login_from(proxy, Some("10.0.0.2"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_garbage_body_is_400() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn missing_or_malformed_header_is_401() {
    let h = harness();
    let (status, _) = send(&h.app, get("/services", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/services")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, get("/services", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewer_can_read_but_not_mutate() {
    let h = harness();
    let viewer = token_for(&h, "viewer", "viewer");

    let (status, body) = send(&h.app, get("/services", Some(&viewer))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "nginx");
    assert_eq!(body["data"][0]["isActive"], true);

    let (status, body) = send(&h.app, post("/services/start/nginx", Some(&viewer), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, _) = send(&h.app, get("/auth/admin/tokens", Some(&viewer))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_role_is_forbidden() {
    let h = harness();
    let token = token_for(&h, "auditor", "auditor");
    let (status, _) = send(&h.app, get("/services", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn revoked_token_is_rejected_immediately() {
    let h = harness();
    let issued = h.tokens.issue("admin", &["admin".to_string()]).unwrap();
    h.tokens.revoke(&issued.record.token_id);

    let (status, _) = send(&h.app, get("/services", Some(&issued.token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_service_is_403() {
    let h = harness();
    let admin = token_for(&h, "admin", "admin");
    let (status, body) = send(&h.app, post("/services/start/sshd", Some(&admin), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("sshd"));
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn service_error_statuses() {
    let h = harness();
    let admin = token_for(&h, "admin", "admin");

    let (status, _) = send(&h.app, get("/services/status/bad..name%20x", Some(&admin))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&h.app, get("/services/status/ghost", Some(&admin))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "service not found");

    let (status, body) = send(&h.app, post("/services/start/stuck", Some(&admin), json!({}))).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["message"].as_str().unwrap().contains("activating"));
}

#[tokio::test]
async fn start_and_stop_report_outcome() {
    let h = harness();
    let admin = token_for(&h, "admin", "admin");

    let (status, body) = send(&h.app, post("/services/start/myapp", Some(&admin), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["changed"], true);
    assert_eq!(body["data"]["action"], "start");

    let (status, body) = send(&h.app, post("/services/stop/myapp", Some(&admin), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["changed"], false);
    assert_eq!(body["message"], "Service myapp is already stopped");
}

#[tokio::test]
async fn logs_lines_parameter() {
    let h = harness();
    let viewer = token_for(&h, "viewer", "viewer");

    let (status, body) = send(&h.app, get("/services/logs/myapp", Some(&viewer))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["message"], "started");
    assert_eq!(h.backend.last_lines.load(Ordering::SeqCst), 100);

    let (status, _) = send(&h.app, get("/services/logs/myapp?lines=20", Some(&viewer))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.backend.last_lines.load(Ordering::SeqCst), 20);

    for bad in ["0", "abc"] {
        let (status, body) = send(
            &h.app,
            get(&format!("/services/logs/myapp?lines={bad}"), Some(&viewer)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }
}

#[tokio::test]
async fn self_service_token_management() {
    let h = harness();
    let first = token_for(&h, "viewer", "viewer");
    let second = h.tokens.issue("viewer", &["viewer".to_string()]).unwrap();
    let other = h.tokens.issue("admin", &["admin".to_string()]).unwrap();

    let (status, body) = send(&h.app, get("/auth/tokens", Some(&first))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // 不能撤销别人的 token
    let (status, _) = send(
        &h.app,
        post("/auth/tokens/revoke", Some(&first), json!({"tokenId": other.record.token_id})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.tokens.get(&other.record.token_id).is_some());

    let (status, body) = send(
        &h.app,
        post("/auth/tokens/revoke", Some(&first), json!({"tokenId": second.record.token_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, body) = send(&h.app, post("/auth/tokens/revoke-all", Some(&first), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);

    let (status, _) = send(&h.app, get("/auth/tokens", Some(&first))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_revoking_unknown_token_is_warning() {
    let h = harness();
    let admin = token_for(&h, "admin", "admin");
    let (status, body) = send(
        &h.app,
        post("/auth/tokens/revoke", Some(&admin), json!({"tokenId": "does-not-exist"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "warning");
    assert_eq!(body["message"], "Token not found or already revoked");
}

#[tokio::test]
async fn refresh_rotates_token() {
    let h = harness();
    let old = token_for(&h, "viewer", "viewer");

    let (status, body) = send(&h.app, post("/auth/tokens/refresh", Some(&old), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let new = body["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = send(&h.app, get("/services", Some(&old))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&h.app, get("/services", Some(&new))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_token_management() {
    let h = harness();
    let admin = token_for(&h, "admin", "admin");
    for _ in 0..3 {
        h.tokens.issue("viewer", &["viewer".to_string()]).unwrap();
    }

    let (status, body) = send(&h.app, get("/auth/admin/tokens", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    let (status, _) = send(&h.app, get("/auth/admin/tokens/user", Some(&admin))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.app,
        get("/auth/admin/tokens/user?userId=viewer", Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, body) = send(
        &h.app,
        post("/auth/admin/tokens/revoke", Some(&admin), json!({"userId": "viewer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"count": 3, "userId": "viewer"}));
    assert!(h.tokens.list_for_user("viewer").is_empty());

    let (status, _) = send(
        &h.app,
        post("/auth/admin/tokens/revoke", Some(&admin), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_404_envelope() {
    let h = harness();
    let (status, body) = send(&h.app, get("/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 404);
}
