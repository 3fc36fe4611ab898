//! 异步 start/stop 之后的状态确认轮询

use crate::error::{Result, ServiceError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// 轮询间隔与总超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// 以固定间隔调用 `query`，直到观察到 `targets` 之一或超时。
///
/// 返回观察到的状态；超时返回 `Timeout` 并携带最后一次观察值，
/// query 出错则立即中止。
pub async fn wait_for_state<F, Fut>(
    name: &str,
    targets: &[&str],
    config: PollConfig,
    mut query: F,
) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let deadline = Instant::now() + config.timeout;
    loop {
        sleep(config.interval).await;
        let state = query().await?;
        debug!(service = %name, state = %state, "polled service state");
        if targets.iter().any(|t| *t == state) {
            return Ok(state);
        }
        if Instant::now() >= deadline {
            return Err(ServiceError::Timeout {
                name: name.to_string(),
                target: targets.join("|"),
                last_state: state,
            });
        }
    }
}
