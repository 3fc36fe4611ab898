use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sysmanix_core::{AuthError, ServiceError};

/// 统一错误响应：`{status: "error", message, code}`，code 与 HTTP 状态码一致
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidName(_) => ApiError::bad_request("invalid service name"),
            ServiceError::ProtectedResource(_) => ApiError::forbidden(err.to_string()),
            ServiceError::Timeout { .. } => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, err.to_string())
            }
            ServiceError::Adapter(msg) => ApiError::internal(msg),
            ServiceError::Unsupported(_) => ApiError::internal(err.to_string()),
            ServiceError::Io(e) => {
                tracing::error!(error = %e, "io error");
                ApiError::internal("internal error")
            }
            ServiceError::Serde(e) => {
                tracing::error!(error = %e, "serde error");
                ApiError::internal("internal error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_token_failure() {
            return ApiError::unauthorized(err.to_string());
        }
        tracing::error!(error = %err, "auth subsystem error");
        ApiError::internal("internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "message": self.message,
            "code": self.status.as_u16(),
        }));
        (self.status, body).into_response()
    }
}
