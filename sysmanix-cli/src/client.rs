use anyhow::Context;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// API 统一响应外壳
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_warning(&self) -> bool {
        self.status == "warning"
    }

    /// 取出 data，缺失时报错
    pub fn into_data(self) -> anyhow::Result<T> {
        self.data
            .with_context(|| format!("response has no data: {}", self.message))
    }
}

/// Build an HTTP client with optional Bearer token default header.
pub fn build_client(token: Option<&str>) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(tok) = token {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", tok).parse()?);
        builder = builder.default_headers(headers);
    }
    Ok(builder.build()?)
}

/// Normalize non-2xx responses into errors while returning the response on success.
pub async fn handle_error(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    debug!(url = %resp.url(), status = %status, "API request failed");
    let body: Value = resp
        .json()
        .await
        .unwrap_or_else(|_| json!({"message": "unknown error"}));
    Err(anyhow::anyhow!(error_message(status, &body)))
}

/// 成功响应解析为 envelope
pub async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> anyhow::Result<Envelope<T>> {
    let resp = handle_error(resp).await?;
    resp.json::<Envelope<T>>()
        .await
        .context("failed to decode API response")
}

fn error_message(status: StatusCode, body: &Value) -> String {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    match status {
        StatusCode::UNAUTHORIZED => format!(
            "request failed {}: {} (run `smx login` or pass --token)",
            status, message
        ),
        _ => format!("request failed {}: {}", status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_uses_envelope_message() {
        let body = json!({"status": "error", "message": "Service sshd is protected", "code": 403});
        let msg = error_message(StatusCode::FORBIDDEN, &body);
        assert!(msg.contains("403"));
        assert!(msg.contains("Service sshd is protected"));

        let msg = error_message(StatusCode::UNAUTHORIZED, &json!({}));
        assert!(msg.contains("unknown error"));
        assert!(msg.contains("smx login"));
    }

    #[test]
    fn envelope_warning_without_data() {
        let env: Envelope<Value> = serde_json::from_value(json!({
            "status": "warning",
            "message": "Token not found or already revoked"
        }))
        .unwrap();
        assert!(env.is_warning());
        assert!(env.into_data().is_err());
    }
}
