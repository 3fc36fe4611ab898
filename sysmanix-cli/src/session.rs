//! 本地保存登录得到的 token：`<config_dir>/sysmanix/token`

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn token_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("sysmanix").join("token"))
}

/// 读取已保存的 token，文件不存在或为空返回 None
pub fn load_token_from(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn save_token_to(path: &Path, token: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, token).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    debug!(path = %path.display(), "token saved");
    Ok(())
}

pub fn clear_token_at(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "token removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// 显式传入的 token 优先，否则使用本地保存的
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    explicit
        .filter(|t| !t.trim().is_empty())
        .or_else(|| token_path().as_deref().and_then(load_token_from))
}

pub fn save_token(token: &str) -> anyhow::Result<PathBuf> {
    let path = token_path().context("cannot determine config directory")?;
    save_token_to(&path, token)?;
    Ok(path)
}

pub fn clear_token() -> anyhow::Result<()> {
    match token_path() {
        Some(path) => clear_token_at(&path),
        None => Ok(()),
    }
}
