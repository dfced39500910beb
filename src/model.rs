use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One persisted request. Created atomically at the end of handling and
/// never updated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_id: String,
    pub method: String,
    pub endpoint: String,
    pub url: Option<String>,
    pub response_status: i64,
    pub response_status_text: Option<String>,
    pub request_headers: Option<Value>,
    pub request_body: Option<Value>,
    pub response_body: Option<Value>,
    pub user_id: Option<i64>,
    pub user_ip: Option<String>,
    pub curl_repro: Option<String>,
    pub elapsed_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// One trace checkpoint, related to its request by request_id value.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TraceEntry {
    pub request_id: String,
    pub sequence: i64,
    pub user_id: Option<i64>,
    pub file: Option<String>,
    pub function: Option<String>,
    pub line: Option<i64>,
    pub elapsed_seconds: Option<f64>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full record plus its ordered trace stack, as served by the read API.
#[derive(Debug, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub record: RequestRecord,
    pub stack: Vec<TraceEntry>,
}

/// Abbreviated request used for paginated listing. Omits url, bodies,
/// headers, the curl reproduction and the trace stack.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RequestDigest {
    pub request_id: String,
    pub method: String,
    pub endpoint: String,
    pub response_status: i64,
    pub response_status_text: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub user_id: Option<i64>,
    pub user_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated statistics for one (method, endpoint) pair within a window.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStat {
    pub method: String,
    pub endpoint: String,
    pub total: i64,
    pub successes_percent: i64,
    pub average_elapsed_seconds: f64,
    pub responses: Vec<StatusCount>,
}

/// Count of one response status within a window for a (method, endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub response_status: i64,
    pub response_status_text: Option<String>,
    pub total: i64,
}

/// Pagination metadata and navigation links for the logs listing.
#[derive(Debug, Clone, Serialize)]
pub struct PageLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_page: Option<String>,
    pub has_more: bool,
    pub current_page: i64,
    pub last_page: i64,
    pub current_size: i64,
}

/// Elapsed times are persisted with 5 fractional digits.
pub fn round_elapsed(seconds: f64) -> f64 {
    (seconds * 100_000.0).round() / 100_000.0
}
