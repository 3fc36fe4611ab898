use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use sysmanix_core::auth::{extract_bearer, Claims, RoleGate, ROLE_ADMIN};

use super::error::ApiError;
use super::state::AppState;

/// 认证信息扩展，由 auth_middleware 写入
#[derive(Debug, Clone)]
pub struct AuthInfo {
	pub claims: Claims,
}

impl AuthInfo {
	pub fn user_id(&self) -> &str {
		&self.claims.uid
	}

	pub fn is_admin(&self) -> bool {
		self.claims.has_role(ROLE_ADMIN)
	}
}

/// 从请求中提取客户端 IP
///
/// 默认只用 socket 地址；`trust_proxy` 开启时才依次采用 X-Real-IP、X-Forwarded-For（第一个）。
pub fn client_ip(
	headers: &HeaderMap,
	connect: Option<&ConnectInfo<SocketAddr>>,
	trust_proxy: bool,
) -> String {
	if trust_proxy {
		if let Some(real_ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
			let real_ip = real_ip.trim();
			if !real_ip.is_empty() {
				return real_ip.to_string();
			}
		}

		if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
			if let Some(first_ip) = forwarded.split(',').next().map(|s| s.trim()) {
				if !first_ip.is_empty() {
					return first_ip.to_string();
				}
			}
		}
	}

	connect
		.map(|ci| ci.0.ip().to_string())
		.unwrap_or_else(|| "unknown".to_string())
}

/// Bearer 校验：失败一律 401，成功后把 claims 挂到请求扩展上
pub async fn auth_middleware(
	State(state): State<AppState>,
	mut request: Request<Body>,
	next: Next,
) -> Result<Response, ApiError> {
	let header = request
		.headers()
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok());

	let token = extract_bearer(header).map_err(|_| {
		ApiError::unauthorized("missing or malformed Authorization header")
	})?;

	let claims = state.tokens.validate(token).map_err(|e| {
		tracing::warn!(path = %request.uri().path(), error = %e, "token rejected");
		ApiError::from(e)
	})?;

	request.extensions_mut().insert(AuthInfo { claims });
	Ok(next.run(request).await)
}

/// 角色检查：claims 角色与要求集合无交集则 403
pub async fn require_role(
	State(gate): State<RoleGate>,
	request: Request<Body>,
	next: Next,
) -> Result<Response, ApiError> {
	let auth = request
		.extensions()
		.get::<AuthInfo>()
		.ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

	if !gate.allows(&auth.claims.roles) {
		tracing::warn!(
			user_id = %auth.user_id(),
			path = %request.uri().path(),
			required = ?gate.required(),
			"insufficient role"
		);
		return Err(ApiError::forbidden("insufficient permissions"));
	}
	Ok(next.run(request).await)
}
