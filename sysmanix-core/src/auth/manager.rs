//! Token 管理器：核心结构、存储、持久化与过期清理

use super::models::TokenRecord;
use crate::error::AuthError;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

const DEFAULT_ISSUER: &str = "SysManix";

/// token 有效期上限（365 天）
pub const MAX_TOKEN_TTL: std::time::Duration = std::time::Duration::from_secs(365 * 24 * 60 * 60);

/// Token 生命周期管理器。
///
/// 进程内只构造一次（启动时从快照加载），通过 `Arc` 注入认证中间件与登录接口。
/// 所有变更操作持有写锁并在临界区内同步落盘（整库重写），
/// 因此同一存储上的 issue/revoke 永远不会交错写文件。
/// 持久化文件假定只有单个进程写入，没有文件锁。
pub struct TokenManager {
    /// JWT 签名密钥（HS256）
    pub(super) jwt_secret: String,
    /// JWT iss
    pub(super) issuer: String,
    /// Token 有效期
    pub(super) token_ttl: Duration,
    /// 快照文件路径；None 表示纯内存（测试用）
    pub(super) store_path: Option<PathBuf>,
    pub(super) tokens: RwLock<HashMap<String, TokenRecord>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("token_ttl", &self.token_ttl)
            .field("store_path", &self.store_path)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// 构造器和配置
// ============================================================================

impl TokenManager {
    /// 创建纯内存的管理器，默认有效期 24 小时
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            token_ttl: Duration::hours(24),
            store_path: None,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// 配置 JWT iss
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// 配置 token 有效期，必须在 (0, MAX_TOKEN_TTL] 之内
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Result<Self, AuthError> {
        if ttl.is_zero() || ttl > MAX_TOKEN_TTL {
            return Err(AuthError::Other(format!(
                "token ttl must be between 1s and {}s, got {}s",
                MAX_TOKEN_TTL.as_secs(),
                ttl.as_secs()
            )));
        }
        self.token_ttl = Duration::from_std(ttl)
            .map_err(|e| AuthError::Other(format!("token ttl out of range: {}", e)))?;
        Ok(self)
    }

    /// 绑定快照文件并加载上次成功持久化的内容。
    ///
    /// 文件不存在视为空存储；文件损坏则返回错误（由调用方决定是否中止启动）。
    pub fn open<P: AsRef<Path>>(mut self, path: P) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        let loaded = load_snapshot(&path)?;
        info!(path = %path.display(), tokens = loaded.len(), "token store loaded");
        self.tokens = RwLock::new(loaded);
        self.store_path = Some(path);
        Ok(self)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }
}

// ============================================================================
// 存储操作
// ============================================================================

impl TokenManager {
    /// 写入一条记录并落盘
    pub(super) fn store(&self, record: TokenRecord) {
        let mut tokens = self.write_tokens();
        debug!(user_id = %record.user_id, expires_at = %record.expires_at, "token stored");
        tokens.insert(record.token_id.clone(), record);
        self.persist_locked(&tokens);
    }

    /// 查询存储中的记录（不区分是否过期）
    pub fn get(&self, token_id: &str) -> Option<TokenRecord> {
        self.read_tokens().get(token_id).cloned()
    }

    /// 撤销单个 token；返回是否确实存在
    #[instrument(skip(self))]
    pub fn revoke(&self, token_id: &str) -> bool {
        let mut tokens = self.write_tokens();
        if tokens.remove(token_id).is_some() {
            debug!("token revoked");
            self.persist_locked(&tokens);
            true
        } else {
            false
        }
    }

    /// 撤销某用户的全部 token，返回撤销数量
    #[instrument(skip(self))]
    pub fn revoke_all(&self, user_id: &str) -> usize {
        let mut tokens = self.write_tokens();
        let before = tokens.len();
        tokens.retain(|_, record| record.user_id != user_id);
        let removed = before - tokens.len();
        if removed > 0 {
            info!(removed, "revoked user tokens");
            self.persist_locked(&tokens);
        }
        removed
    }

    /// 所有未过期的 token，按签发时间排序
    pub fn list_active(&self) -> Vec<TokenRecord> {
        self.collect_active(|_| true)
    }

    /// 某用户未过期的 token
    pub fn list_for_user(&self, user_id: &str) -> Vec<TokenRecord> {
        self.collect_active(|record| record.user_id == user_id)
    }

    /// 清理所有过期记录，返回清理数量
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.write_tokens();
        let before = tokens.len();
        tokens.retain(|_, record| record.is_active_at(now));
        let removed = before - tokens.len();
        if removed > 0 {
            debug!(removed, "removed expired tokens");
            self.persist_locked(&tokens);
        }
        removed
    }

    /// 启动后台清理任务（固定间隔）。返回的句柄在关闭时 abort。
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }

    /// 关闭前落盘当前快照
    pub fn flush(&self) -> Result<(), AuthError> {
        let tokens = self.read_tokens();
        match &self.store_path {
            Some(path) => write_snapshot(path, &tokens),
            None => Ok(()),
        }
    }

    fn collect_active<F>(&self, filter: F) -> Vec<TokenRecord>
    where
        F: Fn(&TokenRecord) -> bool,
    {
        let now = Utc::now();
        let mut list: Vec<TokenRecord> = self
            .read_tokens()
            .values()
            .filter(|record| record.is_active_at(now) && filter(record))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.token_id.cmp(&b.token_id)));
        list
    }

    /// 在写锁内整库重写；失败只记录日志，内存状态仍然有效
    fn persist_locked(&self, tokens: &HashMap<String, TokenRecord>) {
        if let Some(path) = &self.store_path {
            if let Err(e) = write_snapshot(path, tokens) {
                error!(path = %path.display(), error = %e, "failed to save tokens");
            }
        }
    }

    pub(super) fn read_tokens(&self) -> RwLockReadGuard<'_, HashMap<String, TokenRecord>> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_tokens(&self) -> RwLockWriteGuard<'_, HashMap<String, TokenRecord>> {
        self.tokens.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn load_snapshot(path: &Path) -> Result<HashMap<String, TokenRecord>, AuthError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read(path)?;
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_slice(&data)?)
}

/// 先写临时文件再 rename，避免中途崩溃留下半个文件
fn write_snapshot(path: &Path, tokens: &HashMap<String, TokenRecord>) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let data = serde_json::to_vec_pretty(tokens)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
