//! 认证数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token 存储记录（持久化到 tokens.json，按 token_id 索引）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// 唯一 ID，同时写入 JWT 的 jti
    pub token_id: String,
    /// 用户 ID（即登录用户名）
    pub user_id: String,
    pub roles: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// JWT Claims 结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject: 用户 ID
    pub sub: String,
    /// 用户 ID（冗余字段，便于客户端直接读取）
    pub uid: String,
    pub roles: Vec<String>,
    /// Token ID，用于与存储交叉校验以支持撤销
    pub jti: String,
    pub iss: String,
    /// 签发时间戳 (Unix timestamp)
    pub iat: i64,
    /// 生效时间戳
    pub nbf: i64,
    /// 过期时间戳
    pub exp: i64,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// 签发结果：签名后的 token 字符串及其存储记录
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub record: TokenRecord,
}

/// 登录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_id: String,
    pub roles: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            token_id: issued.record.token_id,
            roles: issued.record.roles,
            expires_at: issued.record.expires_at,
        }
    }
}

/// 撤销单个 token 的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenRequest {
    #[serde(default)]
    pub token_id: String,
}

/// 管理员撤销某用户全部 token 的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRevokeRequest {
    #[serde(default)]
    pub user_id: String,
}
