use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;

use wiretap::config::RecorderConfig;
use wiretap::recorder::{self, AuthUser, RecorderState};
use wiretap::track;
use wiretap::writer::LogWriter;

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

/// Matches the recorder's body capture cap.
const BODY_CAP: usize = 10 * 1024 * 1024;

fn recorded_app(pool: SqlitePool, config: RecorderConfig) -> Router {
    let writer = LogWriter::new(pool, 100);
    let state = RecorderState::new(&config, writer);

    Router::new()
        .route("/profile/:id", get(show_profile))
        .route("/login", post(login))
        .route("/upload", post(upload))
        .route("/download", get(download))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .layer(middleware::from_fn_with_state(state, recorder::record))
        .layer(axum::extract::DefaultBodyLimit::max(BODY_CAP + 1024))
}

async fn show_profile(
    axum::extract::Path(id): axum::extract::Path<i64>,
) -> Json<Value> {
    track!("loading profile");
    track!();
    Json(json!({ "id": id, "name": "ada" }))
}

async fn login(body: String) -> Json<Value> {
    let _ = body;
    Json(json!({ "token": "issued" }))
}

async fn upload(body: axum::body::Bytes) -> Json<Value> {
    Json(json!({ "received": body.len() }))
}

async fn download() -> Vec<u8> {
    vec![0x62; BODY_CAP + 1]
}

/// The writer persists off the request path, so tests poll for the row.
async fn wait_for_request(pool: &SqlitePool, endpoint: &str) -> (String, i64) {
    for _ in 0..100 {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT request_id, response_status FROM requests WHERE endpoint = ?1",
        )
        .bind(endpoint)
        .fetch_optional(pool)
        .await
        .unwrap();
        if let Some(row) = row {
            return row;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("request for {} never persisted", endpoint);
}

#[tokio::test]
async fn test_request_and_stack_persisted() {
    let pool = memory_pool().await;
    let app = recorded_app(pool.clone(), RecorderConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/profile/42?verbose=1")
                .header("user-agent", "integration/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Response passes through untouched.
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["id"], 42);

    let (request_id, status) = wait_for_request(&pool, "/profile/:id").await;
    assert_eq!(request_id.len(), 14);
    assert_eq!(status, 200);

    let (method, url, status_text, headers, response_body, elapsed): (
        String,
        String,
        String,
        String,
        String,
        f64,
    ) = sqlx::query_as(
        "SELECT method, url, response_status_text, request_headers, response_body,
                elapsed_seconds
         FROM requests WHERE request_id = ?1",
    )
    .bind(&request_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(method, "GET");
    assert_eq!(url, "/profile/42?verbose=1");
    assert_eq!(status_text, "OK");
    assert!(elapsed >= 0.0);

    // Only the configured headers are logged; absent ones come through null.
    let headers: Value = serde_json::from_str(&headers).unwrap();
    assert_eq!(headers["user-agent"], "integration/1");
    assert!(headers["x-authorization"].is_null());

    let response_body: Value = serde_json::from_str(&response_body).unwrap();
    assert_eq!(response_body["name"], "ada");

    // Both track! calls made it into the stack, in order.
    let entries: Vec<(i64, String, Option<String>)> = sqlx::query_as(
        "SELECT sequence, function, message FROM trace_entries
         WHERE request_id = ?1 ORDER BY sequence",
    )
    .bind(&request_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, 1);
    assert_eq!(entries[0].2.as_deref(), Some("loading profile"));
    assert!(entries[0].1.contains("show_profile"));
    assert_eq!(entries[1].0, 2);
    assert_eq!(entries[1].2, None);
}

#[tokio::test]
async fn test_password_fields_masked_in_body_and_curl() {
    let pool = memory_pool().await;
    let app = recorded_app(pool.clone(), RecorderConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("content-type", "application/json")
                .header("host", "api.example.com")
                .body(Body::from(
                    r#"{"username":"ada","password":"hunter2","profile":{"password_repeat":"hunter2"}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (request_id, _) = wait_for_request(&pool, "/login").await;
    let (request_body, curl): (String, String) = sqlx::query_as(
        "SELECT request_body, curl_repro FROM requests WHERE request_id = ?1",
    )
    .bind(&request_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let body: Value = serde_json::from_str(&request_body).unwrap();
    assert_eq!(body["username"], "ada");
    assert_eq!(body["password"], "*******");
    assert_eq!(body["profile"]["password_repeat"], "*******");

    // The reproduction carries the masked body and the original host.
    assert!(curl.starts_with("curl -s -X POST"));
    assert!(curl.contains("http://api.example.com/login"));
    assert!(curl.contains("*******"));
    assert!(!curl.contains("hunter2"));
    assert!(curl.ends_with(" --compressed"));
}

#[tokio::test]
async fn test_over_cap_request_body_reaches_handler_uncaptured() {
    let pool = memory_pool().await;
    let app = recorded_app(pool.clone(), RecorderConfig::default());

    // Valid JSON one byte past the capture cap: too big to record,
    // but the handler must still receive every byte.
    let padding = "a".repeat(BODY_CAP - 14);
    let payload = format!(r#"{{"password":"{}"}}"#, padding);
    assert!(payload.len() > BODY_CAP);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("content-type", "application/json")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["received"], payload.len());

    let (request_id, status) = wait_for_request(&pool, "/upload").await;
    assert_eq!(status, 200);
    let (request_body,): (Option<String>,) =
        sqlx::query_as("SELECT request_body FROM requests WHERE request_id = ?1")
            .bind(&request_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(request_body, None);
}

#[tokio::test]
async fn test_over_cap_response_body_reaches_client_uncaptured() {
    let pool = memory_pool().await;
    let app = recorded_app(pool.clone(), RecorderConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.len(), BODY_CAP + 1);

    let (request_id, _) = wait_for_request(&pool, "/download").await;
    let (response_body,): (Option<String>,) =
        sqlx::query_as("SELECT response_body FROM requests WHERE request_id = ?1")
            .bind(&request_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(response_body, None);
}

#[tokio::test]
async fn test_auth_extension_attributes_user() {
    let pool = memory_pool().await;
    let app = recorded_app(pool.clone(), RecorderConfig::default())
        .layer(axum::middleware::from_fn(
            |mut req: axum::extract::Request, next: axum::middleware::Next| async move {
                req.extensions_mut().insert(AuthUser { id: 7 });
                next.run(req).await
            },
        ));

    app.oneshot(
        Request::builder()
            .uri("/profile/1")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let (request_id, _) = wait_for_request(&pool, "/profile/:id").await;
    let (user_id,): (Option<i64>,) =
        sqlx::query_as("SELECT user_id FROM requests WHERE request_id = ?1")
            .bind(&request_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(user_id, Some(7));

    let (entry_user,): (Option<i64>,) =
        sqlx::query_as("SELECT user_id FROM trace_entries WHERE request_id = ?1")
            .bind(&request_id)
            .fetch_optional(&pool)
            .await
            .unwrap()
            .unwrap_or((None,));
    assert_eq!(entry_user, Some(7));
}

#[tokio::test]
async fn test_disabled_recorder_records_nothing() {
    let pool = memory_pool().await;
    let config = RecorderConfig {
        enabled: false,
        ..RecorderConfig::default()
    };
    let app = recorded_app(pool.clone(), config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/profile/9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_non_2xx_status_text_recorded() {
    let pool = memory_pool().await;
    let app = recorded_app(pool.clone(), RecorderConfig::default());

    app.oneshot(
        Request::builder()
            .uri("/missing")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let (request_id, status) = wait_for_request(&pool, "/missing").await;
    assert_eq!(status, 404);
    let (text,): (Option<String>,) =
        sqlx::query_as("SELECT response_status_text FROM requests WHERE request_id = ?1")
            .bind(&request_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(text.as_deref(), Some("Not Found"));
}

#[tokio::test]
async fn test_stack_timers_disabled_leaves_elapsed_null() {
    let pool = memory_pool().await;
    let config = RecorderConfig {
        stack_timers_enabled: false,
        ..RecorderConfig::default()
    };
    let app = recorded_app(pool.clone(), config);

    app.oneshot(
        Request::builder()
            .uri("/profile/3")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let (request_id, _) = wait_for_request(&pool, "/profile/:id").await;
    let elapsed: Vec<(Option<f64>,)> = sqlx::query_as(
        "SELECT elapsed_seconds FROM trace_entries WHERE request_id = ?1",
    )
    .bind(&request_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(elapsed.len(), 2);
    assert!(elapsed.iter().all(|(e,)| e.is_none()));
}
