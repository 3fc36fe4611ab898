//! 认证相关 API handlers：登录与自助 token 管理

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde_json::json;
use sysmanix_core::auth::{LoginRequest, LoginResponse, RevokeTokenRequest, TokenRecord};
use tracing::{info, instrument};

use crate::app::middleware::{client_ip, AuthInfo};
use crate::app::response::Envelope;
use crate::app::{ApiError, AppState};

/// POST /auth/login - 用户登录
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Envelope<LoginResponse>, ApiError> {
    let ip = client_ip(&headers, connect.as_ref(), state.trust_proxy);
    if !state.login_limiter.allow(&ip).await {
        tracing::warn!(ip = %ip, "login rate limit hit");
        return Err(ApiError::too_many_requests(
            "too many login attempts, try again later",
        ));
    }

    let Json(req) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let roles = state
        .credentials
        .authenticate(&req.username, &req.password)
        .await
        .map_err(|_| ApiError::unauthorized("Invalid credentials"))?;

    let issued = state.tokens.issue(&req.username, &roles)?;
    info!(user_id = %req.username, ip = %ip, "user logged in");
    Ok(Envelope::success("Login successful", issued.into()))
}

/// GET /auth/tokens - 当前用户的有效 token
pub async fn list_tokens(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
) -> Envelope<Vec<TokenRecord>> {
    let tokens = state.tokens.list_for_user(auth.user_id());
    Envelope::success("User tokens retrieved successfully", tokens)
}

/// POST /auth/tokens/revoke - 撤销单个 token（非管理员只能撤销自己的）
#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    body: Result<Json<RevokeTokenRequest>, JsonRejection>,
) -> Result<Envelope<()>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if req.token_id.is_empty() {
        return Err(ApiError::bad_request("tokenId is required"));
    }

    if !auth.is_admin() {
        let owned = state
            .tokens
            .list_for_user(auth.user_id())
            .iter()
            .any(|t| t.token_id == req.token_id);
        if !owned {
            return Err(ApiError::forbidden(
                "Forbidden: You can only revoke your own tokens",
            ));
        }
    }

    if state.tokens.revoke(&req.token_id) {
        info!(token_id = %req.token_id, "token revoked");
        Ok(Envelope::message("Token revoked successfully"))
    } else {
        Ok(Envelope::warning("Token not found or already revoked"))
    }
}

/// POST /auth/tokens/revoke-all - 撤销当前用户的全部 token（包括本次请求所用的）
#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn revoke_all_tokens(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
) -> Envelope<serde_json::Value> {
    let count = state.tokens.revoke_all(auth.user_id());
    Envelope::success("All tokens revoked successfully", json!({ "count": count }))
}

/// POST /auth/tokens/refresh - 撤销当前 token 并签发新 token
#[instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
) -> Result<Envelope<LoginResponse>, ApiError> {
    let issued = state.tokens.refresh(&auth.claims)?;
    Ok(Envelope::success("Token refreshed successfully", issued.into()))
}
