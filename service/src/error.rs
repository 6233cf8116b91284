//! HTTP error taxonomy.
//!
//! One application-level error type for all handlers, mapped to a
//! consistent `{error, code}` JSON body. Validation and auth errors are
//! surfaced immediately; upstream errors keep the failing stage and the
//! attempted URL so operators can tell which outbound call failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::mail::MailError;
use crate::store::StoreError;
use crate::unifi::ControllerError;

/// Application-level error for HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed required field (400).
    #[error("{0}")]
    Validation(String),

    /// Missing/invalid bearer token (401).
    #[error("{0}")]
    Auth(String),

    /// Authenticated but not an admin (403).
    #[error("{0}")]
    Forbidden(String),

    /// Referenced template/campaign/guest absent (404).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Email provider or wireless controller call failed (502).
    #[error("upstream {stage} call failed at {url}: {message}")]
    Upstream {
        stage: String,
        url: String,
        message: String,
    },

    /// Relational-store write/read failed (500).
    #[error("store operation failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Convenience alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::Upstream {
            stage: "email-provider".to_string(),
            url: err.url().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        ApiError::Upstream {
            stage: format!("controller-{}", err.stage),
            url: err.url.clone(),
            message: err.message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::Auth(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{what} not found"),
            ),
            ApiError::Upstream { .. } => {
                tracing::error!(error = %self, "upstream_call_failed");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", self.to_string())
            }
            ApiError::Persistence(err) => {
                tracing::error!(error = %err, "store_operation_failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
