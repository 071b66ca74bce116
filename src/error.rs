use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub const RIDE_UNAVAILABLE: &str = "this ride is no longer available";
pub const MUST_BE_ONLINE: &str = "you must be online to accept rides";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn ride_unavailable() -> Self {
        AppError::Conflict(RIDE_UNAVAILABLE.to_string())
    }

    pub fn must_be_online() -> Self {
        AppError::Permission(MUST_BE_ONLINE.to_string())
    }

    /// Message suitable for showing to the caller as-is.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Permission(msg)
            | AppError::Conflict(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthenticated(msg) => msg.clone(),
            AppError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Permission(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.user_message()
        }));

        (status, body).into_response()
    }
}
