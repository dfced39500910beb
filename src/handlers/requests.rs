use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, Method},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::auth;
use crate::error::AppError;
use crate::reader::{self, PageRequest};
use crate::stats::{self, Window};

use super::{data_envelope, page_envelope};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub default_page_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Read-API router. Every route sits behind the key gate; CORS is wide open
/// for GET so browser-based viewers can call it from any origin.
pub fn router(pool: SqlitePool, default_page_size: i64) -> Router {
    let state = ApiState {
        pool: pool.clone(),
        default_page_size,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static(auth::KEY_HEADER),
        ]);

    Router::new()
        .route("/requests/:request_id", get(show_request))
        .route("/requests/logs/:number/:units/ago", get(list_requests))
        .route("/requests/stats/:number/:units/ago", get(endpoint_stats))
        .layer(middleware::from_fn_with_state(pool, auth::require_api_key))
        .layer(cors)
        .with_state(state)
}

/// One request with its ordered trace stack. Unknown ids are not an error;
/// they answer 200 with an empty object so pollers can treat absent and
/// not-yet-written the same way.
async fn show_request(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let detail = reader::find(&state.pool, &request_id).await?;
    let body = match detail {
        Some(detail) => data_envelope(serde_json::to_value(detail)?),
        None => data_envelope(json!({})),
    };
    Ok(Json(body))
}

/// Paginated digests of requests recorded inside the window, newest first.
async fn list_requests(
    State(state): State<ApiState>,
    Path((number, units)): Path<(i64, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let window = Window::parse(number, &units)?;
    let request = PageRequest::clamped(query.page, query.size, state.default_page_size);
    let base_path = format!("/requests/logs/{}/{}/ago", number, units);
    let (digests, links) = reader::page(&state.pool, window.cutoff(), request, &base_path).await?;
    Ok(Json(page_envelope(serde_json::to_value(digests)?, links)))
}

/// Per-endpoint aggregates over the window.
async fn endpoint_stats(
    State(state): State<ApiState>,
    Path((number, units)): Path<(i64, String)>,
) -> Result<Json<Value>, AppError> {
    let window = Window::parse(number, &units)?;
    let rows = stats::compute(&state.pool, &window).await?;
    Ok(Json(data_envelope(serde_json::to_value(rows)?)))
}
