//! 平台服务管理：统一接口、受保护服务拦截、状态缓存与状态确认轮询

use crate::error::{Result, ServiceError};
use crate::models::{ActionOutcome, LogEntry, ServiceInfo, ServiceStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

mod cache;
mod guard;
mod poller;
mod runner;
mod systemd;
mod windows;

pub use cache::{StatusCache, DEFAULT_CACHE_TTL};
pub use guard::{validate_service_name, ProtectedSet};
pub use poller::{wait_for_state, PollConfig};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, NativeRunner};
pub use systemd::SystemdBackend;
pub use windows::WindowsBackend;

pub const DEFAULT_LOG_LINES: usize = 100;
pub const MAX_LOG_LINES: usize = 10_000;

/// 平台服务管理器的统一接口。
///
/// 所有按名操作先做名称校验和受保护检查，再调用原生工具。
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// 平台标识（"linux" / "windows"）
    fn platform(&self) -> &'static str;

    /// 全部服务（已排除受保护服务）
    async fn list(&self) -> Result<Vec<ServiceInfo>>;

    /// 单个服务状态，TTL 内走缓存
    async fn status(&self, name: &str) -> Result<ServiceStatus>;

    /// 启动服务；已在运行则直接返回 `changed = false`
    async fn start(&self, name: &str) -> Result<ActionOutcome>;

    /// 停止服务；已停止则直接返回 `changed = false`
    async fn stop(&self, name: &str) -> Result<ActionOutcome>;

    /// 最近 `lines` 条日志（0 取默认值，超过上限截断）
    async fn logs(&self, name: &str, lines: usize) -> Result<Vec<LogEntry>>;
}

/// 按编译目标选择平台实现，只在启动时调用一次
pub fn detect(runner: Arc<dyn CommandRunner>, poll: PollConfig) -> Result<Arc<dyn ServiceBackend>> {
    let backend: Arc<dyn ServiceBackend> = match std::env::consts::OS {
        "linux" => Arc::new(SystemdBackend::new(runner).with_poll(poll)),
        "windows" => Arc::new(WindowsBackend::new(runner).with_poll(poll)),
        other => return Err(ServiceError::Unsupported(other.to_string())),
    };
    info!(platform = backend.platform(), "service backend selected");
    Ok(backend)
}

pub(crate) fn clamp_lines(lines: usize) -> usize {
    match lines {
        0 => DEFAULT_LOG_LINES,
        n => n.min(MAX_LOG_LINES),
    }
}
