use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types for the read API.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad window amount/unit or pagination input. Carries a message naming
    /// the accepted values.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid API key. Deliberately carries no detail.
    #[error("Forbidden")]
    Forbidden,

    /// Store failure during a read operation.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            // 403 with an empty body: nothing about the key check leaks.
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Self::Validation(msg) => error_envelope(StatusCode::BAD_REQUEST, &msg),
            Self::Database(e) => {
                tracing::error!(error = %e, "read API database error");
                error_envelope(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "read API internal error");
                error_envelope(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

fn error_envelope(status: StatusCode, message: &str) -> Response {
    let body = Json(json!({
        "error": message,
        "details": null,
    }));
    (status, body).into_response()
}
