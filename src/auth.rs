use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::store;

/// Header carrying the read-API key.
pub const KEY_HEADER: &str = "x-wiretap-key";

/// Gate for the read API: every request must present a known key in the
/// `x-wiretap-key` header. Unknown or missing keys get a bare 403 with an
/// empty body so callers learn nothing about the key space.
pub async fn require_api_key(
    State(pool): State<SqlitePool>,
    req: Request,
    next: Next,
) -> Response {
    let key = req
        .headers()
        .get(KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if key.is_empty() {
        return AppError::Forbidden.into_response();
    }

    match store::api_key_exists(&pool, key).await {
        Ok(true) => next.run(req).await,
        Ok(false) => AppError::Forbidden.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "api key lookup failed");
            AppError::Database(e).into_response()
        }
    }
}
