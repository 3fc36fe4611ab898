use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use sysmanix_core::{ActionOutcome, LogEntry, ServiceInfo, ServiceStatus, DEFAULT_LOG_LINES};
use tracing::{info, instrument};

use crate::app::middleware::AuthInfo;
use crate::app::response::Envelope;
use crate::app::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// 原样接收字符串，自行解析以便返回统一的 400 envelope
    lines: Option<String>,
}

#[instrument(skip_all)]
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Envelope<Vec<ServiceInfo>>, ApiError> {
    let services = state.backend.list().await?;
    Ok(Envelope::success("Services retrieved successfully", services))
}

#[instrument(skip_all, fields(service = %name))]
pub async fn get_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Envelope<ServiceStatus>, ApiError> {
    let status = state.backend.status(&name).await?;
    Ok(Envelope::success("Service status retrieved successfully", status))
}

#[instrument(skip_all, fields(service = %name))]
pub async fn get_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Envelope<Vec<LogEntry>>, ApiError> {
    let lines = parse_lines(query.lines.as_deref())?;
    let logs = state.backend.logs(&name, lines).await?;
    Ok(Envelope::success("Service logs retrieved successfully", logs))
}

#[instrument(skip_all, fields(service = %name))]
pub async fn start_service(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    Path(name): Path<String>,
) -> Result<Envelope<ActionOutcome>, ApiError> {
    let outcome = state.backend.start(&name).await?;
    info!(user_id = %auth.user_id(), changed = outcome.changed, "start requested");
    let message = if outcome.changed {
        format!("Service {} started successfully", name)
    } else {
        format!("Service {} is already running", name)
    };
    Ok(Envelope::success(message, outcome))
}

#[instrument(skip_all, fields(service = %name))]
pub async fn stop_service(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    Path(name): Path<String>,
) -> Result<Envelope<ActionOutcome>, ApiError> {
    let outcome = state.backend.stop(&name).await?;
    info!(user_id = %auth.user_id(), changed = outcome.changed, "stop requested");
    let message = if outcome.changed {
        format!("Service {} stopped successfully", name)
    } else {
        format!("Service {} is already stopped", name)
    };
    Ok(Envelope::success(message, outcome))
}

/// 缺省 100；0 或非数字返回 400（上限由后端截断）
fn parse_lines(raw: Option<&str>) -> Result<usize, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_LOG_LINES),
        Some(s) => match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(ApiError::bad_request(format!(
                "invalid lines parameter: {}",
                s
            ))),
            Ok(n) => Ok(n),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_parameter() {
        assert_eq!(parse_lines(None).unwrap(), 100);
        assert_eq!(parse_lines(Some("")).unwrap(), 100);
        assert_eq!(parse_lines(Some("25")).unwrap(), 25);
        assert_eq!(parse_lines(Some("50000")).unwrap(), 50000);
        assert!(parse_lines(Some("0")).is_err());
        assert!(parse_lines(Some("-3")).is_err());
        assert!(parse_lines(Some("ten")).is_err());
    }
}
