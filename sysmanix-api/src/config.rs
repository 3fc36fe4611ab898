use anyhow::{bail, Context};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use sysmanix_core::auth::MAX_TOKEN_TTL;
use tracing::warn;

const MIN_SECRET_LEN: usize = 32;

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// 只识别 "json"，其余一律文本
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    /// 日志初始化早于完整配置加载，单独读取
    pub fn from_env() -> Self {
        Self::parse(env::var("SMX_LOG_FORMAT").ok().as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// 凭据文件（用户名 → 密码哈希 + 角色）
    pub users_file: PathBuf,
    /// token 快照文件
    pub tokens_file: PathBuf,
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// JWT iss
    pub jwt_issuer: String,
    pub token_ttl: Duration,
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// CORS 允许的来源列表（空则允许所有）
    pub cors_origins: Vec<String>,
    pub log_format: LogFormat,
    /// 是否信任反向代理写入的 X-Real-IP / X-Forwarded-For
    pub trust_proxy: bool,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意 key → value 查找函数构造，便于测试
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let bind = match get("SMX_BIND") {
            Some(s) => s.parse().with_context(|| format!("invalid SMX_BIND: {s}"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let data_dir = get("SMX_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let users_file = get("SMX_USERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("users.json"));
        let tokens_file = get("SMX_TOKENS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("tokens.json"));

        // 未配置时每次启动随机生成，重启后旧 token 全部失效
        let jwt_secret = match get("SMX_JWT_SECRET") {
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                bail!("SMX_JWT_SECRET is too short (<{MIN_SECRET_LEN}); use a strong random value")
            }
            Some(secret) => secret,
            None => {
                warn!("SMX_JWT_SECRET not set; generating a random secret for this run");
                random_secret()
            }
        };
        let jwt_issuer = get("SMX_JWT_ISSUER").unwrap_or_else(|| "SysManix".into());

        let token_ttl = Duration::from_secs(parse_u64(&get, "SMX_TOKEN_TTL_SECS", 86_400)?);
        let sweep_interval = Duration::from_secs(parse_u64(&get, "SMX_SWEEP_INTERVAL_SECS", 600)?);
        let request_timeout =
            Duration::from_secs(parse_u64(&get, "SMX_REQUEST_TIMEOUT_SECS", 30)?);
        let poll_interval = Duration::from_millis(parse_u64(&get, "SMX_POLL_INTERVAL_MS", 500)?);
        let poll_timeout = Duration::from_secs(parse_u64(&get, "SMX_POLL_TIMEOUT_SECS", 10)?);

        // 逗号分隔；空或 "*" 表示允许所有
        let cors_origins = get("SMX_CORS_ORIGINS")
            .filter(|s| s != "*")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let log_format = LogFormat::parse(get("SMX_LOG_FORMAT").as_deref());
        let trust_proxy = parse_bool(&get, "SMX_TRUST_PROXY", false)?;

        let config = Self {
            bind,
            data_dir,
            users_file,
            tokens_file,
            jwt_secret,
            jwt_issuer,
            token_ttl,
            sweep_interval,
            request_timeout,
            poll_interval,
            poll_timeout,
            cors_origins,
            log_format,
            trust_proxy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_ttl.is_zero() {
            bail!("SMX_TOKEN_TTL_SECS must be greater than zero");
        }
        if self.token_ttl > MAX_TOKEN_TTL {
            bail!(
                "SMX_TOKEN_TTL_SECS must not exceed {} ({}s given)",
                MAX_TOKEN_TTL.as_secs(),
                self.token_ttl.as_secs()
            );
        }
        if self.sweep_interval.is_zero() {
            bail!("SMX_SWEEP_INTERVAL_SECS must be greater than zero");
        }
        if self.poll_interval.is_zero() {
            bail!("SMX_POLL_INTERVAL_MS must be greater than zero");
        }
        if self.poll_timeout >= self.request_timeout {
            bail!(
                "poll timeout ({}s) must be shorter than request timeout ({}s)",
                self.poll_timeout.as_secs(),
                self.request_timeout.as_secs()
            );
        }
        Ok(())
    }
}

fn parse_u64<G>(get: &G, key: &str, default: u64) -> anyhow::Result<u64>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {v:?}")),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> anyhow::Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("{key} must be a boolean, got {v:?}"),
        },
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
