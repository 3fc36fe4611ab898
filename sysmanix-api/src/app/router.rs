use std::any::Any;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use sysmanix_core::auth::RoleGate;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::handlers::{
    get_logs, get_status, handler_404, health, list_all_tokens, list_services, list_tokens,
    list_user_tokens, login, refresh_token, revoke_all_tokens, revoke_token, revoke_user_tokens,
    start_service, stop_service,
};
use super::middleware::{auth_middleware, require_role};
use super::state::AppState;

/// 路由层面的可调参数
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// CORS 允许的来源列表（空则允许所有）
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// 根据配置的来源列表构建 CorsLayer
fn build_cors_layer(cors_origins: Vec<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if cors_origins.is_empty() {
        tracing::warn!(
            "SMX_CORS_ORIGINS not configured, allowing all origins. \
             Set SMX_CORS_ORIGINS in production."
        );
        base.allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .into_iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        base.allow_origin(origins).allow_credentials(true)
    }
}

/// handler panic 转为 500 envelope
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "handler panicked");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

/// Build the router with routes and middleware wired.
///
/// 中间件顺序（外到内）：panic 恢复 → 请求日志 → 超时 → CORS → 认证 → 角色检查
pub fn app_router(state: AppState, options: RouterOptions) -> Router {
    // 公开端点
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login));

    // admin + viewer：只读操作与自助 token 管理
    let read_routes = Router::new()
        .route("/auth/tokens", get(list_tokens))
        .route("/auth/tokens/revoke", post(revoke_token))
        .route("/auth/tokens/revoke-all", post(revoke_all_tokens))
        .route("/auth/tokens/refresh", post(refresh_token))
        .route("/services", get(list_services))
        .route("/services/status/:name", get(get_status))
        .route("/services/logs/:name", get(get_logs))
        .route_layer(from_fn_with_state(RoleGate::READ, require_role));

    // 仅 admin：变更操作与管理员 token 管理
    let admin_routes = Router::new()
        .route("/services/start/:name", post(start_service))
        .route("/services/stop/:name", post(stop_service))
        .route("/auth/admin/tokens", get(list_all_tokens))
        .route("/auth/admin/tokens/user", get(list_user_tokens))
        .route("/auth/admin/tokens/revoke", post(revoke_user_tokens))
        .route_layer(from_fn_with_state(RoleGate::ADMIN, require_role));

    // route_layer 只作用于已匹配的路由，未知路径直接落到 404
    let protected_routes = Router::new()
        .merge(read_routes)
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(handler_404)
        .layer(build_cors_layer(options.cors_origins))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}
