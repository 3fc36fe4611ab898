use thiserror::Error;

/// Common result type for core operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// 服务编排层错误：适配器把原生工具的失败归类为以下几种。
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid service name: {0}")]
    InvalidName(String),
    #[error("operation not allowed on protected system service: {0}")]
    ProtectedResource(String),
    /// 原生工具非零退出或输出无法解析（"不存在" 也归入此类）
    #[error("{0}")]
    Adapter(String),
    #[error("timeout waiting for service {name} to become {target} (status: {last_state})")]
    Timeout {
        name: String,
        target: String,
        last_state: String,
    },
    #[error("unsupported platform: {0}")]
    Unsupported(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 认证相关错误（token 校验、凭据校验、持久化）。
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid credential file: {0}")]
    InvalidCredentialFile(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// token 本身的问题（对应 401），区别于服务端内部故障
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed
                | AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::Revoked
                | AuthError::InvalidCredentials
        )
    }
}
