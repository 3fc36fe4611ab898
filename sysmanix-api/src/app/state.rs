use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use sysinfo::System;
use sysmanix_core::auth::{CredentialStore, TokenManager};
use sysmanix_core::ServiceBackend;

use super::RateLimiter;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token 生命周期管理（签发、校验、撤销）
    pub tokens: Arc<TokenManager>,
    pub credentials: Arc<CredentialStore>,
    /// 启动时按平台选定的服务后端
    pub backend: Arc<dyn ServiceBackend>,
    /// 登录接口限流（按 IP）
    pub login_limiter: Arc<RateLimiter>,
    /// 限流键是否采用代理转发的客户端 IP
    pub trust_proxy: bool,
    pub started_at: DateTime<Utc>,
    /// 健康检查读取进程内存用
    pub system: Arc<Mutex<System>>,
}
