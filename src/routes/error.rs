//! Error responses for the HTTP API.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::purge::PurgeError;

/// Error body: `{"error": {"type", "message", "code"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error category, e.g. "invalid_request_error" or "server_error"
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
                code: Some(code.into()),
            },
        }
    }
}

/// Startup failures keep the `success` flag the trigger's success body carries.
#[derive(Debug, Serialize)]
struct StartupFailure {
    success: bool,
    error: ErrorInfo,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("A purge run is already in progress")]
    AlreadyRunning,

    /// The eligible set could not be counted.
    #[error("{0}")]
    Startup(String),

    #[error("No database configured")]
    DatabaseRequired,
}

impl From<PurgeError> for ApiError {
    fn from(err: PurgeError) -> Self {
        match err {
            PurgeError::AlreadyRunning => ApiError::AlreadyRunning,
            PurgeError::InvalidConfig(msg) => ApiError::BadRequest(msg),
            PurgeError::Startup(e) => ApiError::Startup(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                msg,
            ),
            ApiError::AlreadyRunning => (
                StatusCode::CONFLICT,
                "conflict_error",
                "purge_in_progress",
                "A purge run is already in progress".to_string(),
            ),
            ApiError::DatabaseRequired => (
                StatusCode::NOT_IMPLEMENTED,
                "server_error",
                "feature_not_available",
                "This endpoint requires a database. Configure [database] and rebuild with --features database-sqlite or --features database-postgres.".to_string(),
            ),
            ApiError::Startup(message) => {
                tracing::error!(error = %message, "Purge could not start");
                let body = StartupFailure {
                    success: false,
                    error: ErrorInfo {
                        error_type: "server_error".to_string(),
                        message,
                        code: Some("purge_startup_failed".to_string()),
                    },
                };
                return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            }
        };

        (
            status,
            Json(ErrorResponse::with_type(error_type, code, message)),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::db::DbError;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_shape() {
        let (status, body) = render(ApiError::BadRequest("batch_size must be > 0".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "bad_request");
        assert_eq!(body["error"]["message"], "batch_size must be > 0");
    }

    #[tokio::test]
    async fn test_purge_errors_map_to_status() {
        let (status, _) = render(PurgeError::AlreadyRunning.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = render(PurgeError::InvalidConfig("bad".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            render(PurgeError::Startup(DbError::Internal("count failed".into())).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "purge_startup_failed");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("count failed")
        );
    }
}
