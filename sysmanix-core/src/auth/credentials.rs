//! 凭据存储：用户名 → 密码哈希 + 角色

use super::crypto::{hash_password, verify_password, DUMMY_HASH, HASH_PREFIX};
use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// 凭据文件中的单个用户条目
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// 明文密码，仅在首次加载时出现，随后被哈希并从文件中移除
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// 只读凭据存储，启动时加载一次
#[derive(Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, Credential>,
}

impl CredentialStore {
    /// 从 JSON 文件加载。
    ///
    /// 明文 `password` 会被 Argon2id 哈希并写回文件；缺少角色、缺少密码或哈希不是 Argon2id 的条目直接拒绝。
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            AuthError::InvalidCredentialFile(format!("{}: {}", path.display(), e))
        })?;
        let mut users: BTreeMap<String, Credential> = serde_json::from_slice(&data)
            .map_err(|e| AuthError::InvalidCredentialFile(format!("{}: {}", path.display(), e)))?;

        let mut rehashed = 0usize;
        for (username, cred) in users.iter_mut() {
            if let Some(plain) = cred.password.take().filter(|p| !p.is_empty()) {
                cred.password_hash = hash_password(&plain).await?;
                rehashed += 1;
            }
            validate_entry(username, cred)?;
        }

        if rehashed > 0 {
            let out = serde_json::to_vec_pretty(&users)?;
            tokio::fs::write(path, out).await?;
            warn!(
                path = %path.display(),
                count = rehashed,
                "plain text passwords were hashed and written back"
            );
        }

        info!(path = %path.display(), users = users.len(), "credentials loaded");
        Ok(Self {
            users: users.into_iter().collect(),
        })
    }

    /// 从内存条目构造（条目必须已包含哈希）
    pub fn from_credentials<I>(entries: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (String, Credential)>,
    {
        let users: HashMap<String, Credential> = entries.into_iter().collect();
        for (username, cred) in &users {
            validate_entry(username, cred)?;
        }
        Ok(Self { users })
    }

    pub fn lookup(&self, username: &str) -> Option<&Credential> {
        self.users.get(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// 校验用户名与密码，成功返回该用户的角色。
    ///
    /// 用户不存在与密码错误返回同一个错误，且同样执行一次哈希校验。
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Vec<String>, AuthError> {
        let Some(cred) = self.lookup(username) else {
            verify_password(password, DUMMY_HASH).await;
            warn!(username = %username, "login failed: unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &cred.password_hash).await {
            warn!(username = %username, "login failed: invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(cred.roles.clone())
    }
}

fn validate_entry(username: &str, cred: &Credential) -> Result<(), AuthError> {
    if cred.password_hash.is_empty() {
        return Err(AuthError::InvalidCredentialFile(format!(
            "user {} has no password set",
            username
        )));
    }
    if !cred.password_hash.starts_with(HASH_PREFIX) {
        return Err(AuthError::InvalidCredentialFile(format!(
            "user {} has an unsupported password hash (expected {}...)",
            username, HASH_PREFIX
        )));
    }
    if cred.roles.is_empty() {
        return Err(AuthError::InvalidCredentialFile(format!(
            "user {} has no assigned roles",
            username
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::hash_password_blocking;
    use tempfile::TempDir;
    use std::time::Instant;

    fn hashed(password: &str, roles: &[&str]) -> Credential {
        Credential {
            password: None,
            password_hash: hash_password_blocking(password).unwrap(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn authenticate_returns_roles() {
        let store = CredentialStore::from_credentials([
            ("admin".to_string(), hashed("admin-pass", &["admin"])),
            ("viewer".to_string(), hashed("viewer-pass", &["viewer"])),
        ])
        .unwrap();

        let roles = store.authenticate("admin", "admin-pass").await.unwrap();
        assert_eq!(roles, vec!["admin".to_string()]);
        assert!(matches!(
            store.authenticate("admin", "nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            store.authenticate("ghost", "admin-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn load_hashes_plain_passwords_and_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            r#"{"admin": {"password": "letmein", "roles": ["admin"]}}"#,
        )
        .unwrap();

        let store = CredentialStore::load(&path).await.unwrap();
        assert!(store.authenticate("admin", "letmein").await.is_ok());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw["admin"].get("password").is_none());
        assert!(raw["admin"]["passwordHash"]
            .as_str()
            .unwrap()
            .starts_with("$argon2id$v=19$m=65536,t=1,p=4$"));
    }

    #[tokio::test]
    async fn load_rejects_incomplete_entries() {
        let dir = TempDir::new().unwrap();

        let no_roles = dir.path().join("no_roles.json");
        std::fs::write(&no_roles, r#"{"a": {"passwordHash": "$argon2id$v=19$m=65536,t=1,p=4$abc$def"}}"#).unwrap();
        assert!(matches!(
            CredentialStore::load(&no_roles).await,
            Err(AuthError::InvalidCredentialFile(_))
        ));

        let no_password = dir.path().join("no_password.json");
        std::fs::write(&no_password, r#"{"a": {"roles": ["viewer"]}}"#).unwrap();
        assert!(matches!(
            CredentialStore::load(&no_password).await,
            Err(AuthError::InvalidCredentialFile(_))
        ));
    }

    #[tokio::test]
    async fn load_rejects_non_argon2id_hashes() {
        let dir = TempDir::new().unwrap();
        for hash in ["$2b$04$abcdefghijklmnopqrstuv", "$argon2i$v=19$m=65536,t=1,p=4$abc$def", "not-a-hash"] {
            let path = dir.path().join("users.json");
            let body = serde_json::json!({"a": {"passwordHash": hash, "roles": ["viewer"]}});
            std::fs::write(&path, body.to_string()).unwrap();
            let err = CredentialStore::load(&path).await.unwrap_err();
            assert!(
                matches!(err, AuthError::InvalidCredentialFile(ref msg) if msg.contains("unsupported")),
                "{hash}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_user_pays_for_a_hash_check() {
        let store =
            CredentialStore::from_credentials([("admin".to_string(), hashed("admin-pass", &["admin"]))])
                .unwrap();

        let started = Instant::now();
        let _ = store.authenticate("admin", "wrong").await;
        let known = started.elapsed();

        let started = Instant::now();
        let err = store.authenticate("ghost", "wrong").await.unwrap_err();
        let unknown = started.elapsed();

        assert!(matches!(err, AuthError::InvalidCredentials));
        // 两条路径都执行一次 64 MiB 的 Argon2id，耗时应处于同一量级
        assert!(unknown * 4 >= known, "unknown={unknown:?} known={known:?}");
    }

    #[tokio::test]
    async fn missing_file_names_path() {
        let err = CredentialStore::load("/definitely/not/here/users.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("users.json"));
    }
}
