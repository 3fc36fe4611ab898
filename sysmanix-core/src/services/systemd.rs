//! Linux 实现：systemctl 控制、journalctl 日志

use super::runner::decode_output;
use super::*;
use crate::models::ServiceAction;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

const SYSTEMCTL: &str = "systemctl";
const JOURNALCTL: &str = "journalctl";

const STARTED: &[&str] = &["active"];
/// failed 也视为已停止
const STOPPED: &[&str] = &["inactive", "failed"];

/// systemd/journald 适配器
pub struct SystemdBackend {
    runner: Arc<dyn CommandRunner>,
    protected: ProtectedSet,
    cache: StatusCache,
    poll: PollConfig,
}

impl SystemdBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            protected: ProtectedSet::linux(),
            cache: StatusCache::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    async fn systemctl<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = CommandSpec::new(SYSTEMCTL).args(args);
        self.runner.run(&spec).await?.check(SYSTEMCTL)
    }

    /// 仅查询 ActiveState，用于幂等判断和轮询
    async fn active_state(&self, name: &str) -> Result<String> {
        let out = self
            .systemctl(["show", name, "--property=ActiveState"])
            .await?;
        parse_properties(&out)
            .into_iter()
            .find(|(k, _)| k == "ActiveState")
            .map(|(_, v)| v)
            .ok_or_else(|| ServiceError::Adapter("unexpected systemctl output".into()))
    }

    async fn transition(&self, name: &str, action: ServiceAction) -> Result<ActionOutcome> {
        self.protected.check(name)?;

        let targets = match action {
            ServiceAction::Start => STARTED,
            ServiceAction::Stop => STOPPED,
        };
        let current = self.active_state(name).await?;
        if targets.contains(&current.as_str()) {
            debug!(service = %name, state = %current, "already in target state");
            return Ok(ActionOutcome {
                name: name.to_string(),
                action,
                changed: false,
                status: current,
            });
        }

        let spec = CommandSpec::new(SYSTEMCTL).args([action.as_str(), name]);
        self.runner.spawn_detached(&spec).await?;
        self.cache.invalidate(name).await;

        let status = wait_for_state(name, targets, self.poll, || self.active_state(name)).await?;
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
impl ServiceBackend for SystemdBackend {
    fn platform(&self) -> &'static str {
        "linux"
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<ServiceInfo>> {
        let out = self
            .systemctl([
                "list-units",
                "--type=service",
                "--all",
                "--no-pager",
                "--plain",
                "--no-legend",
            ])
            .await?;
        let now = Utc::now();
        Ok(parse_list_units(&out, now)
            .into_iter()
            .filter(|svc| !self.protected.contains(&svc.name))
            .collect())
    }

    #[instrument(skip(self))]
    async fn status(&self, name: &str) -> Result<ServiceStatus> {
        self.protected.check(name)?;
        if let Some(cached) = self.cache.get_fresh(name).await {
            return Ok(cached);
        }

        let out = self
            .systemctl([
                "show",
                name,
                "--property=LoadState,ActiveState,SubState,UnitFileState",
            ])
            .await?;
        let status = parse_show(name, &out, Utc::now())?;
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
        let lines = clamp_lines(lines);
        let spec = CommandSpec::new(JOURNALCTL).args([
            "-u".to_string(),
            name.to_string(),
            "--no-pager".to_string(),
            "-n".to_string(),
            lines.to_string(),
            "--output=json".to_string(),
        ]);
        let out = self.runner.run(&spec).await?.check(JOURNALCTL)?;
        Ok(parse_journal(&out))
    }
}

/// `KEY=VALUE` 行
fn parse_properties(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn parse_show(name: &str, output: &str, now: DateTime<Utc>) -> Result<ServiceStatus> {
    let props = parse_properties(output);
    let get = |key: &str| {
        props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    if get("LoadState") == Some("not-found") {
        return Err(ServiceError::Adapter("service not found".into()));
    }
    let active = get("ActiveState")
        .ok_or_else(|| ServiceError::Adapter("unexpected systemctl output".into()))?;

    Ok(ServiceStatus {
        name: name.to_string(),
        status: active.to_string(),
        is_active: active == "active",
        updated_at: now,
    })
}

/// `UNIT LOAD ACTIVE SUB DESCRIPTION...`
fn parse_list_units(output: &str, now: DateTime<Utc>) -> Vec<ServiceInfo> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_start_matches(|c: char| c == '●' || c == '*' || c.is_whitespace());
            let mut cols = line.split_whitespace();
            let unit = cols.next()?;
            let _load = cols.next()?;
            let active = cols.next()?;
            let sub = cols.next()?;
            let description = cols.collect::<Vec<_>>().join(" ");

            let name = unit.strip_suffix(".service").unwrap_or(unit).to_string();
            let display_name = if description.is_empty() {
                name.clone()
            } else {
                description
            };
            Some(ServiceInfo {
                name,
                display_name,
                status: sub.to_string(),
                is_active: active == "active",
                updated_at: now,
            })
        })
        .collect()
}

/// journalctl `--output=json`：每行一个对象；无法解析的行原样作为消息
fn parse_journal(output: &str) -> Vec<LogEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => LogEntry {
                time: obj
                    .get("__REALTIME_TIMESTAMP")
                    .and_then(value_as_string)
                    .and_then(|micros| micros.parse::<i64>().ok())
                    .and_then(format_micros)
                    .unwrap_or_default(),
                level: obj
                    .get("PRIORITY")
                    .and_then(value_as_string)
                    .and_then(|p| p.parse::<u8>().ok())
                    .map(priority_name)
                    .unwrap_or_default()
                    .to_string(),
                message: obj.get("MESSAGE").map(message_text).unwrap_or_default(),
            },
            _ => {
                debug!(line = %line, "non-json journal line");
                LogEntry {
                    message: line.to_string(),
                    ..LogEntry::default()
                }
            }
        })
        .collect()
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// MESSAGE 含非 UTF-8 字节时 journald 输出字节数组
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            decode_output(&bytes)
        }
        Value::Null => String::new(),
        other => {
            warn!(value = %other, "unexpected journal MESSAGE type");
            other.to_string()
        }
    }
}

fn format_micros(micros: i64) -> Option<String> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn priority_name(priority: u8) -> &'static str {
    match priority {
        0 => "emerg",
        1 => "alert",
        2 => "crit",
        3 => "err",
        4 => "warning",
        5 => "notice",
        6 => "info",
        7 => "debug",
        _ => "",
    }
}
