//! 管理员 token 管理

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use sysmanix_core::auth::{AdminRevokeRequest, TokenRecord};
use tracing::{info, instrument};

use crate::app::middleware::AuthInfo;
use crate::app::response::Envelope;
use crate::app::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    user_id: Option<String>,
}

/// GET /auth/admin/tokens
pub async fn list_all_tokens(State(state): State<AppState>) -> Envelope<Vec<TokenRecord>> {
    Envelope::success("All tokens retrieved successfully", state.tokens.list_active())
}

/// GET /auth/admin/tokens/user?userId=
pub async fn list_user_tokens(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Envelope<Vec<TokenRecord>>, ApiError> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing userId parameter"))?;
    Ok(Envelope::success(
        "User tokens retrieved successfully",
        state.tokens.list_for_user(&user_id),
    ))
}

/// POST /auth/admin/tokens/revoke `{userId}`
#[instrument(skip_all, fields(admin = %auth.user_id()))]
pub async fn revoke_user_tokens(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    body: Result<Json<AdminRevokeRequest>, JsonRejection>,
) -> Result<Envelope<serde_json::Value>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;
    if req.user_id.is_empty() {
        return Err(ApiError::bad_request("userId is required"));
    }

    let count = state.tokens.revoke_all(&req.user_id);
    info!(user_id = %req.user_id, count, "admin revoked user tokens");
    Ok(Envelope::success(
        "All user tokens revoked successfully",
        json!({ "count": count, "userId": req.user_id }),
    ))
}
