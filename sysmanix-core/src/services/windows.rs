//! Windows 实现：通过 PowerShell 查询/控制 Service Control Manager。
//!
//! 脚本全部是静态文本，服务名经子进程环境变量 `SMX_SERVICE_NAME` 传入。

use super::*;
use crate::models::ServiceAction;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

const POWERSHELL: &str = "powershell";
const NAME_VAR: &str = "SMX_SERVICE_NAME";
const LINES_VAR: &str = "SMX_LOG_LINES";

const RUNNING: &[&str] = &["Running"];
const STOPPED: &[&str] = &["Stopped"];

const LIST_SCRIPT: &str = r#"
Get-Service | ForEach-Object {
    [PSCustomObject]@{
        Name = $_.Name
        DisplayName = $_.DisplayName
        Status = $_.Status.ToString()
    }
} | ConvertTo-Json -Compress
"#;

const STATUS_SCRIPT: &str = r#"
$service = Get-Service -Name $env:SMX_SERVICE_NAME -ErrorAction Stop
[PSCustomObject]@{
    Name = $service.Name
    DisplayName = $service.DisplayName
    Status = $service.Status.ToString()
} | ConvertTo-Json -Compress
"#;

const START_SCRIPT: &str = "Start-Service -Name $env:SMX_SERVICE_NAME -ErrorAction Stop";
const STOP_SCRIPT: &str = "Stop-Service -Name $env:SMX_SERVICE_NAME -ErrorAction Stop";

const LOGS_SCRIPT: &str = r#"
$service = Get-Service -Name $env:SMX_SERVICE_NAME -ErrorAction Stop
$name = $service.Name
$display = $service.DisplayName
$events = Get-WinEvent -FilterHashtable @{
    LogName = 'System'
    ID = @(7036, 7045, 7040)
    StartTime = (Get-Date).AddDays(-7)
} -MaxEvents ([int]$env:SMX_LOG_LINES) -ErrorAction SilentlyContinue |
    Where-Object { $_.Message -like "*$display*" -or $_.Message -like "*$name*" } |
    Select-Object @{Name='time';Expression={$_.TimeCreated.ToUniversalTime().ToString('o')}},
                  @{Name='level';Expression={$_.LevelDisplayName}},
                  @{Name='message';Expression={$_.Message}}
if ($events -eq $null) { '[]' } else { $events | ConvertTo-Json -Compress }
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawService {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    status: Value,
}

/// Get-WinEvent 投影，字段可能为 null
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<RawEvent> for LogEntry {
    fn from(raw: RawEvent) -> Self {
        Self {
            time: raw.time.unwrap_or_default(),
            level: raw.level.unwrap_or_default(),
            message: raw.message.unwrap_or_default(),
        }
    }
}

impl RawService {
    /// Status 通常是字符串；旧版 PowerShell 直接序列化枚举时是数字
    fn status_text(&self) -> String {
        match &self.status {
            Value::String(s) => s.clone(),
            Value::Number(n) => match n.as_u64() {
                Some(1) => "Stopped",
                Some(2) => "StartPending",
                Some(3) => "StopPending",
                Some(4) => "Running",
                Some(5) => "ContinuePending",
                Some(6) => "PausePending",
                Some(7) => "Paused",
                _ => "Unknown",
            }
            .to_string(),
            _ => "Unknown".to_string(),
        }
    }
}

/// Service Control Manager 适配器
pub struct WindowsBackend {
    runner: Arc<dyn CommandRunner>,
    protected: ProtectedSet,
    cache: StatusCache,
    poll: PollConfig,
}

impl WindowsBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            protected: ProtectedSet::windows(),
            cache: StatusCache::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn script(script: &str) -> CommandSpec {
        CommandSpec::new(POWERSHELL).args([
            "-NoProfile",
            "-NonInteractive",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            script,
        ])
    }

    async fn powershell(&self, spec: CommandSpec) -> Result<String> {
        self.runner.run(&spec).await?.check(POWERSHELL)
    }

    async fn query(&self, name: &str) -> Result<RawService> {
        let out = self
            .powershell(Self::script(STATUS_SCRIPT).env(NAME_VAR, name))
            .await?;
        let mut services: Vec<RawService> = parse_one_or_many(&out)?;
        services
            .pop()
            .ok_or_else(|| ServiceError::Adapter("empty response from powershell".into()))
    }

    async fn transition(&self, name: &str, action: ServiceAction) -> Result<ActionOutcome> {
        self.protected.check(name)?;

        let (targets, script) = match action {
            ServiceAction::Start => (RUNNING, START_SCRIPT),
            ServiceAction::Stop => (STOPPED, STOP_SCRIPT),
        };
        let current = self.query(name).await?.status_text();
        if targets.contains(&current.as_str()) {
            debug!(service = %name, state = %current, "already in target state");
            return Ok(ActionOutcome {
                name: name.to_string(),
                action,
                changed: false,
                status: current,
            });
        }

        self.runner
            .spawn_detached(&Self::script(script).env(NAME_VAR, name))
            .await?;
        self.cache.invalidate(name).await;

        let status = wait_for_state(name, targets, self.poll, || async {
            Ok(self.query(name).await?.status_text())
        })
        .await?;
        info!(service = %name, action = action.as_str(), status = %status, "service state confirmed");
        Ok(ActionOutcome {
            name: name.to_string(),
            action,
            changed: true,
            status,
        })
    }
}

#[async_trait]
impl ServiceBackend for WindowsBackend {
    fn platform(&self) -> &'static str {
        "windows"
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<ServiceInfo>> {
        let out = self.powershell(Self::script(LIST_SCRIPT)).await?;
        let now = Utc::now();
        let raw: Vec<RawService> = parse_one_or_many(&out)?;
        Ok(raw
            .into_iter()
            .filter(|svc| !self.protected.contains(&svc.name))
            .map(|svc| {
                let status = svc.status_text();
                ServiceInfo {
                    display_name: svc
                        .display_name
                        .clone()
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| svc.name.clone()),
                    is_active: status == "Running",
                    name: svc.name,
                    status,
                    updated_at: now,
                }
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn status(&self, name: &str) -> Result<ServiceStatus> {
        self.protected.check(name)?;
        if let Some(cached) = self.cache.get_fresh(name).await {
            return Ok(cached);
        }

        let raw = self.query(name).await?;
        let status_text = raw.status_text();
        let status = ServiceStatus {
            name: name.to_string(),
            is_active: status_text == "Running",
            status: status_text,
            updated_at: Utc::now(),
        };
        self.cache.insert(status.clone()).await;
        Ok(status)
    }

    #[instrument(skip(self))]
    async fn start(&self, name: &str) -> Result<ActionOutcome> {
        self.transition(name, ServiceAction::Start).await
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str) -> Result<ActionOutcome> {
        self.transition(name, ServiceAction::Stop).await
    }

    #[instrument(skip(self))]
    async fn logs(&self, name: &str, lines: usize) -> Result<Vec<LogEntry>> {
        self.protected.check(name)?;
        let spec = Self::script(LOGS_SCRIPT)
            .env(NAME_VAR, name)
            .env(LINES_VAR, clamp_lines(lines).to_string());
        let out = self.powershell(spec).await?;
        let events: Vec<RawEvent> = parse_one_or_many(&out)?;
        Ok(events.into_iter().map(LogEntry::from).collect())
    }
}

/// ConvertTo-Json 对单个对象不输出数组，两种形态都接受；空输出视为空列表
fn parse_one_or_many<T: DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ServiceError::Adapter(format!("failed to parse powershell output: {}", e)))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| {
                ServiceError::Adapter(format!("failed to parse powershell output: {}", e))
            })
        })
        .collect()
}
