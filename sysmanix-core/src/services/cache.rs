//! 按服务名缓存状态查询结果（惰性过期，无后台清理）

use crate::models::ServiceStatus;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, ServiceStatus>>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// TTL 内的缓存值；过期条目视为未命中
    pub async fn get_fresh(&self, name: &str) -> Option<ServiceStatus> {
        let entries = self.entries.read().await;
        let status = entries.get(name)?;
        let age = Utc::now().signed_duration_since(status.updated_at);
        match age.to_std() {
            Ok(age) if age >= self.ttl => None,
            _ => Some(status.clone()),
        }
    }

    pub async fn insert(&self, status: ServiceStatus) {
        self.entries
            .write()
            .await
            .insert(status.name.clone(), status);
    }

    /// start/stop 后无条件移除
    pub async fn invalidate(&self, name: &str) {
        self.entries.write().await.remove(name);
    }
}
