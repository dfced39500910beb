use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::model::{PageLinks, RequestDetail, RequestDigest, RequestRecord, TraceEntry};

/// Validated pagination input. Out-of-range values clamp rather than error:
/// page below 1 becomes 1, size below 1 becomes 1.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn clamped(page: Option<i64>, size: Option<i64>, default_size: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            size: size.unwrap_or(default_size).max(1),
        }
    }
}

/// One page of request digests newer than `since`, newest first, plus the
/// pagination metadata and relative navigation links.
pub async fn page(
    pool: &SqlitePool,
    since: DateTime<Utc>,
    request: PageRequest,
    base_path: &str,
) -> Result<(Vec<RequestDigest>, PageLinks), sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests WHERE created_at > ?1")
        .bind(since)
        .fetch_one(pool)
        .await?;

    let last_page = ((total + request.size - 1) / request.size).max(1);
    let offset = (request.page - 1) * request.size;

    let digests: Vec<RequestDigest> = sqlx::query_as(
        r#"
        SELECT request_id, method, endpoint, response_status, response_status_text,
               elapsed_seconds, user_id, user_ip, created_at
        FROM requests
        WHERE created_at > ?1
        ORDER BY created_at DESC, id DESC
        LIMIT ?2 OFFSET ?3
        "#,
    )
    .bind(since)
    .bind(request.size)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let has_more = request.page < last_page;
    let links = PageLinks {
        next_page: has_more.then(|| {
            format!("{}?page={}&size={}", base_path, request.page + 1, request.size)
        }),
        previous_page: (request.page > 1).then(|| {
            format!("{}?page={}&size={}", base_path, request.page - 1, request.size)
        }),
        has_more,
        current_page: request.page,
        last_page,
        current_size: request.size,
    };

    Ok((digests, links))
}

/// The full record for one request id, including its ordered trace stack.
/// Absence is a valid empty answer, not an error.
pub async fn find(
    pool: &SqlitePool,
    request_id: &str,
) -> Result<Option<RequestDetail>, sqlx::Error> {
    let row: Option<RequestRow> = sqlx::query_as(
        r#"
        SELECT request_id, method, endpoint, url, response_status, response_status_text,
               request_headers, request_body, response_body,
               user_id, user_ip, curl_repro,
               COALESCE(elapsed_seconds, 0.0) AS elapsed_seconds, created_at
        FROM requests
        WHERE request_id = ?1
        LIMIT 1
        "#,
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let stack: Vec<TraceEntry> = sqlx::query_as(
        r#"
        SELECT request_id, sequence, user_id, file, function, line,
               elapsed_seconds, message, created_at
        FROM trace_entries
        WHERE request_id = ?1
        ORDER BY sequence
        "#,
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(RequestDetail {
        record: row.into_record(),
        stack,
    }))
}

/// Raw row shape: the JSON columns come back as TEXT and are decoded here.
#[derive(sqlx::FromRow)]
struct RequestRow {
    request_id: String,
    method: String,
    endpoint: String,
    url: Option<String>,
    response_status: i64,
    response_status_text: Option<String>,
    request_headers: Option<String>,
    request_body: Option<String>,
    response_body: Option<String>,
    user_id: Option<i64>,
    user_ip: Option<String>,
    curl_repro: Option<String>,
    elapsed_seconds: f64,
    created_at: DateTime<Utc>,
}

impl RequestRow {
    fn into_record(self) -> RequestRecord {
        RequestRecord {
            request_id: self.request_id,
            method: self.method,
            endpoint: self.endpoint,
            url: self.url,
            response_status: self.response_status,
            response_status_text: self.response_status_text,
            request_headers: decode_json(self.request_headers),
            request_body: decode_json(self.request_body),
            response_body: decode_json(self.response_body),
            user_id: self.user_id,
            user_ip: self.user_ip,
            curl_repro: self.curl_repro,
            elapsed_seconds: self.elapsed_seconds,
            created_at: self.created_at,
        }
    }
}

fn decode_json(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}
