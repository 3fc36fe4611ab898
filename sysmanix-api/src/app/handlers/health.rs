use axum::extract::State;
use axum::http::Uri;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, System};

use crate::app::response::Envelope;
use crate::app::{ApiError, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    version: &'static str,
    uptime_secs: i64,
    started_at: DateTime<Utc>,
    platform: &'static str,
    /// 当前进程内存占用，平台不支持时为 null
    memory: Option<ProcessMemory>,
}

/// 进程内存统计 (bytes)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMemory {
    rss_bytes: u64,
    virtual_bytes: u64,
}

fn process_memory(system: &mut System) -> Option<ProcessMemory> {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(e) => {
            tracing::debug!(error = %e, "cannot resolve current pid");
            return None;
        }
    };
    system.refresh_process_specifics(pid, ProcessRefreshKind::new());
    system.process(pid).map(|process| ProcessMemory {
        rss_bytes: process.memory(),
        virtual_bytes: process.virtual_memory(),
    })
}

pub async fn health(State(state): State<AppState>) -> Envelope<Health> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0);
    let memory = {
        let mut system = state.system.lock().unwrap_or_else(|e| e.into_inner());
        process_memory(&mut system)
    };
    Envelope::success(
        "healthy",
        Health {
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs,
            started_at: state.started_at,
            platform: state.backend.platform(),
            memory,
        },
    )
}

/// 未匹配路由
pub async fn handler_404(uri: Uri) -> ApiError {
    tracing::debug!(path = %uri.path(), "no route");
    ApiError::not_found(format!("route not found: {}", uri.path()))
}
