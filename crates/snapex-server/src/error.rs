//! API error handling.
//!
//! Every handler error renders as `{"error": {"type": ..., "message": ...}}`
//! with a status derived from the engine error it came from.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use snapex::{MountError, SnapexError, ValidationError};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "invalid_state", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SnapexError> for ApiError {
    fn from(err: SnapexError) -> Self {
        match err {
            SnapexError::Validation(e) => ApiError::validation(e.to_string()),
            SnapexError::NotFound { .. } => ApiError::not_found(err.to_string()),
            SnapexError::InvalidState { .. } => ApiError::conflict(err.to_string()),
            SnapexError::Mount(MountError::UnknownSession(_)) => {
                ApiError::not_found(err.to_string())
            }
            _ => {
                tracing::error!("Request failed: {}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}

impl From<MountError> for ApiError {
    fn from(err: MountError) -> Self {
        SnapexError::from(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(ValidationError::Malformed(rejection.body_text()).to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                SnapexError::Validation(ValidationError::MissingField("name")),
                StatusCode::BAD_REQUEST,
            ),
            (SnapexError::job_not_found("j1"), StatusCode::NOT_FOUND),
            (
                SnapexError::InvalidState {
                    id: "j1".to_string(),
                    action: "execute",
                    status: "running".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                SnapexError::Mount(MountError::ProviderUnavailable("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_unknown_mount_session_is_not_found() {
        let err: ApiError = MountError::UnknownSession("s9".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("s9"));
    }

    #[tokio::test]
    async fn test_body_shape() {
        let response = ApiError::not_found("Job not found: j1").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "not_found");
        assert_eq!(body["error"]["message"], "Job not found: j1");
    }
}
