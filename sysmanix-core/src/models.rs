use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listing entry for a platform service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub status: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Detailed status for a single service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub status: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// One line of service log output, normalized across platforms.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

/// start/stop 的动作类型。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
        }
    }
}

/// Result of a start/stop request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub name: String,
    pub action: ServiceAction,
    /// false 表示服务本来就处于目标状态，未下发任何命令
    pub changed: bool,
    pub status: String,
}
