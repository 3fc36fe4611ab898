//! 服务名校验与受保护服务拦截。
//!
//! 两项检查都在调用任何原生工具之前执行。

use crate::error::{Result, ServiceError};
use std::collections::HashSet;

const MAX_NAME_LEN: usize = 100;

/// Linux 上对系统稳定性至关重要的服务
const LINUX_CRITICAL: &[&str] = &[
    "systemd",
    "systemd-journald",
    "systemd-logind",
    "systemd-udevd",
    "sshd",
    "dbus",
    "NetworkManager",
    "polkit",
    "user@",
    "selinux",
    "accounts-daemon",
    "agetty",
    "apparmor",
    "cron",
    "rsyslog",
    "systemd-resolved",
    "systemd-timesyncd",
    "systemd-networkd",
    "init",
    "syslog",
    "wpa_supplicant",
    "firewalld",
    "iptables",
    "dnsmasq",
    "cups",
    "fail2ban",
    "nftables",
    "pam",
    "lvm2",
    "mdadm",
    "udisks2",
    "ntpd",
    "chronyd",
];

/// Windows 上的核心服务与进程
const WINDOWS_CRITICAL: &[&str] = &[
    "wininit",
    "csrss",
    "services",
    "lsass",
    "winlogon",
    "smss",
    "svchost",
    "spooler",
    "explorer",
    "fontdrvhost",
    "dwm",
    "taskmgr",
    "conhost",
    "dllhost",
    "audiodg",
    "wuauserv",
    "EventLog",
    "TermService",
    "Schedule",
    "Dnscache",
    "BITS",
    "TrustedInstaller",
    "PcaSvc",
    "LanmanServer",
    "LanmanWorkstation",
    "Dhcp",
    "WinDefend",
    "wscsvc",
    "samss",
    "RpcSs",
    "nsi",
    "netlogon",
    "PlugPlay",
    "VSS",
    "fdPHost",
    "fdResPub",
    "DiagTrack",
    "sppsvc",
    "wmiApSrv",
];

/// 校验服务名：仅允许字母数字、`-`、`_`、`.`，不得以 `-` 开头，最长 100 字符
pub fn validate_service_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidName(name.to_string()))
    }
}

/// 受保护服务集合，构造后不可变。比较一律忽略大小写。
#[derive(Debug, Clone)]
pub struct ProtectedSet {
    names: HashSet<String>,
    /// 为 true 时每个条目同时作为前缀匹配（如 `user@1000`、`systemd-foo`）
    prefix_match: bool,
}

impl ProtectedSet {
    pub fn new<I, S>(names: I, prefix_match: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
            prefix_match,
        }
    }

    /// systemd：精确匹配加前缀匹配
    pub fn linux() -> Self {
        Self::new(LINUX_CRITICAL.iter(), true)
    }

    /// Windows SCM：仅精确匹配
    pub fn windows() -> Self {
        Self::new(WINDOWS_CRITICAL.iter(), false)
    }

    pub fn contains(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        if self.names.contains(&lower) {
            return true;
        }
        self.prefix_match && self.names.iter().any(|p| lower.starts_with(p.as_str()))
    }

    /// 名称校验 + 受保护检查，按此顺序
    pub fn check(&self, name: &str) -> Result<()> {
        validate_service_name(name)?;
        if self.contains(name) {
            return Err(ServiceError::ProtectedResource(name.to_string()));
        }
        Ok(())
    }
}
