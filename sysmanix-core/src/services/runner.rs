//! 原生命令执行：参数以数组/环境变量传递，从不拼接进脚本文本

use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// 一次原生工具调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// 用于日志，不含环境变量
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 命令输出（stdout 已解码）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
        }
    }

    /// 非零退出转为适配器错误（只暴露工具名和退出码）
    pub fn check(self, program: &str) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(exit_error(program, self.code))
        }
    }
}

fn exit_error(program: &str, code: Option<i32>) -> ServiceError {
    match code {
        Some(code) => ServiceError::Adapter(format!("{} exited with status {}", program, code)),
        None => ServiceError::Adapter(format!("{} terminated by signal", program)),
    }
}

/// 原生工具调用接口；测试中替换为脚本化实现
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// 执行并等待完成
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// 启动后立即返回，退出码由后台任务回收
    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<()>;
}

/// 基于 `tokio::process` 的真实实现
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRunner;

impl NativeRunner {
    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.kill_on_drop(false);
        cmd
    }
}

#[async_trait]
impl CommandRunner for NativeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec.display(), "running native command");
        let output = Self::command(spec).output().await.map_err(|e| {
            warn!(command = %spec.display(), error = %e, "failed to launch command");
            ServiceError::Adapter(format!("failed to launch {}", spec.program))
        })?;

        if !output.stderr.is_empty() {
            let stderr = decode_output(&output.stderr);
            if !output.status.success() {
                warn!(command = %spec.display(), code = ?output.status.code(), stderr = %stderr, "command failed");
            } else {
                debug!(command = %spec.display(), stderr = %stderr, "command wrote to stderr");
            }
        }

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: decode_output(&output.stdout),
        })
    }

    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<()> {
        debug!(command = %spec.display(), "spawning detached command");
        let mut child = Self::command(spec)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                warn!(command = %spec.display(), error = %e, "failed to spawn command");
                ServiceError::Adapter(format!("failed to launch {}", spec.program))
            })?;

        let shown = spec.display();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(command = %shown, "detached command finished"),
                Ok(status) => warn!(command = %shown, code = ?status.code(), "detached command failed"),
                Err(e) => warn!(command = %shown, error = %e, "failed to reap detached command"),
            }
        });
        Ok(())
    }
}

/// 尝试 UTF-8 解码，否则回退 GB18030（中文 Windows 控制台），再不行有损转换
pub(crate) fn decode_output(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(v) => v.to_string(),
        Err(_) => {
            let (cow, _, had_errors) = encoding_rs::GB18030.decode(raw);
            if had_errors {
                String::from_utf8_lossy(raw).to_string()
            } else {
                cow.to_string()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_display_omits_env() {
        let spec = CommandSpec::new("systemctl")
            .args(["show", "nginx"])
            .env("SECRET", "x");
        assert_eq!(spec.display(), "systemctl show nginx");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn native_detached_spawn_returns_before_exit() {
        let spec = CommandSpec::new("sh").args(["-c", "sleep 1"]);
        let started = std::time::Instant::now();
        NativeRunner.spawn_detached(&spec).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(900));

        let missing = CommandSpec::new("/definitely/not/a/binary");
        assert!(matches!(
            NativeRunner.spawn_detached(&missing).await,
            Err(ServiceError::Adapter(_))
        ));
    }

    #[test]
    fn failed_output_hides_details() {
        let err = CommandOutput::failed(5).check("systemctl").unwrap_err();
        assert_eq!(err.to_string(), "systemctl exited with status 5");
    }

    #[test]
    fn decode_handles_bom_and_gbk() {
        assert_eq!(decode_output(b"\xEF\xBB\xBF[1]"), "[1]");
        // "服务" in GB18030
        assert_eq!(decode_output(&[0xB7, 0xFE, 0xCE, 0xF1]), "服务");
    }
}
