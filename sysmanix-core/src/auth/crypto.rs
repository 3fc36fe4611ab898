//! 密码加密工具函数（Argon2id，PHC 字符串格式）

use crate::error::AuthError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// 内存开销（KiB）
const MEMORY_KIB: u32 = 64 * 1024;
/// 迭代次数
const ITERATIONS: u32 = 1;
/// 并行度
const PARALLELISM: u32 = 4;
/// 输出长度（字节）
const OUTPUT_LEN: usize = 32;

/// 哈希前缀，凭据文件中只接受这一种格式
pub const HASH_PREFIX: &str = "$argon2id$";

/// 参数与正式哈希一致的占位哈希，用于未知用户的等价耗时校验
pub(crate) const DUMMY_HASH: &str =
    "$argon2id$v=19$m=65536,t=1,p=4$c2FsdHNhbHRzYWx0c2FsdA$3q2+7wAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

fn hasher() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| AuthError::Other(format!("argon2 params: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// 同步哈希密码，返回 `$argon2id$v=19$m=65536,t=1,p=4$<salt>$<hash>`
pub fn hash_password_blocking(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Other(format!("argon2 hash failed: {}", e)))
}

/// 同步校验密码，参数取自 PHC 字符串，比较为常量时间
pub fn verify_password_blocking(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "malformed password hash");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// 异步哈希密码（在阻塞线程中执行 Argon2id）
pub async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password))
        .await
        .map_err(|e| AuthError::Other(format!("spawn_blocking failed: {}", e)))?
}

/// 异步验证密码（在阻塞线程中执行 Argon2id）
///
/// 哈希格式错误同样视为不匹配。
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    match tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash)).await {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!(error = %e, "spawn_blocking failed");
            false
        }
    }
}
