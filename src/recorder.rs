use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use futures::StreamExt;
use rand::RngCore;
use serde_json::Value;

use crate::config::RecorderConfig;
use crate::curl;
use crate::model::{round_elapsed, RequestRecord, TraceEntry};
use crate::redact::redact_body;
use crate::trace;
use crate::writer::{LogJob, LogWriter};

/// Persisted url/file/function columns are capped at this many characters,
/// truncated from the left so the most specific tail survives.
const COLUMN_WIDTH: usize = 254;

/// Bodies over this cap are not captured: they flow through to the other
/// side untouched and the record stores null.
const MAX_CAPTURED_BODY: usize = 10 * 1024 * 1024;

/// Host-application auth context. Insert it as a request extension in an
/// upstream layer and the recorder will attribute the request and its trace
/// entries to this user. Absent extension means anonymous; nothing fails.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

/// Shared state for the recording middleware.
#[derive(Clone)]
pub struct RecorderState {
    enabled: bool,
    stack_timers_enabled: bool,
    password_keys: Arc<Vec<String>>,
    headers_to_log: Arc<Vec<String>>,
    writer: LogWriter,
}

impl RecorderState {
    pub fn new(config: &RecorderConfig, writer: LogWriter) -> Self {
        Self {
            enabled: config.enabled,
            stack_timers_enabled: config.stack_timers_enabled,
            password_keys: Arc::new(config.password_keys()),
            headers_to_log: Arc::new(config.headers_to_log()),
            writer,
        }
    }
}

/// Middleware wrapping the full lifecycle of one request: capture identity
/// and body, time the downstream handler, collect the trace stack, redact,
/// and hand everything to the background writer. The response passes through
/// byte-identical; recording failures never reach the caller.
pub async fn record(State(state): State<RecorderState>, req: Request, next: Next) -> Response {
    if !state.enabled {
        return next.run(req).await;
    }

    let request_id = new_request_id();
    let method = req.method().as_str().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let user_id = req.extensions().get::<AuthUser>().map(|u| u.id);
    let user_ip = client_ip(&req);
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let all_headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let request_headers = logged_headers(&all_headers, &state.headers_to_log);
    let request_is_json = content_type_is_json(&all_headers);

    // Buffer the request body so both the handler and the log can read it.
    let (parts, body) = req.into_parts();
    let (body, body_bytes) = buffer_body(body).await;
    let req = Request::from_parts(parts, body);

    let request_body = match (&body_bytes, request_is_json) {
        (Some(bytes), true) => redact_body(&String::from_utf8_lossy(bytes), &state.password_keys),
        _ => None,
    };

    let curl_url = match &host {
        Some(host) => format!("http://{}{}", host, path_and_query),
        None => path_and_query.clone(),
    };
    let curl_repro = curl::build(&method, &all_headers, &curl_url, request_body.as_ref());

    let started = Instant::now();
    let (response, drained) = trace::with_scope(
        request_id.clone(),
        state.stack_timers_enabled,
        next.run(req),
    )
    .await;
    let elapsed_seconds = round_elapsed(started.elapsed().as_secs_f64());

    let response_status = response.status().as_u16() as i64;
    let response_status_text = response
        .status()
        .canonical_reason()
        .map(str::to_string);

    // Buffer the response body to log it; the same bytes go back out.
    let (parts, body) = response.into_parts();
    let (body, response_bytes) = buffer_body(body).await;
    let response = Response::from_parts(parts, body);

    let created_at = Utc::now();
    let record = RequestRecord {
        request_id: request_id.clone(),
        method,
        endpoint,
        url: Some(tail(&path_and_query, COLUMN_WIDTH)),
        response_status,
        response_status_text,
        request_headers: Some(request_headers),
        request_body,
        response_body: response_bytes
            .as_deref()
            .and_then(capture_response_body)
            .map(CapturedBody::into_value),
        user_id,
        user_ip,
        curl_repro: Some(curl_repro),
        elapsed_seconds,
        created_at,
    };

    let entries: Vec<TraceEntry> = drained
        .into_iter()
        .map(|e| TraceEntry {
            request_id: request_id.clone(),
            sequence: e.sequence,
            user_id,
            file: Some(tail(&e.file, COLUMN_WIDTH)),
            function: Some(tail(&e.function, COLUMN_WIDTH)),
            line: Some(e.line),
            elapsed_seconds: e.elapsed_seconds.map(round_elapsed),
            message: e.message,
            created_at,
        })
        .collect();

    state.writer.enqueue(LogJob { record, entries }).await;

    response
}

/// Drain a body into memory for logging, up to [`MAX_CAPTURED_BODY`].
///
/// Within the cap, returns a rebuilt body carrying the same bytes plus a
/// copy for the record. Over the cap (or on a mid-stream error) the capture
/// is abandoned: the chunks read so far are replayed ahead of the rest of
/// the stream, so the other side still sees every byte, and `None` is
/// returned for the record.
async fn buffer_body(body: Body) -> (Body, Option<Bytes>) {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                total += chunk.len();
                chunks.push(chunk);
                if total > MAX_CAPTURED_BODY {
                    let replay = futures::stream::iter(chunks.into_iter().map(Ok));
                    return (Body::from_stream(replay.chain(stream)), None);
                }
            }
            Some(Err(e)) => {
                let replay = futures::stream::iter(chunks.into_iter().map(Ok))
                    .chain(futures::stream::once(async move { Err(e) }));
                return (Body::from_stream(replay.chain(stream)), None);
            }
            None => break,
        }
    }

    let mut buf = Vec::with_capacity(total);
    for chunk in &chunks {
        buf.extend_from_slice(chunk);
    }
    let bytes = Bytes::from(buf);
    (Body::from(bytes.clone()), Some(bytes))
}

/// 14 hex characters from 7 cryptographically strong random bytes.
/// Uniqueness is probabilistic, not checked against the store.
pub fn new_request_id() -> String {
    let mut bytes = [0u8; 7];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Response body classified once at capture time; everything downstream
/// works from the variant, never re-sniffing the bytes.
#[derive(Debug, PartialEq)]
enum CapturedBody {
    Json(Value),
    RawText(String),
}

impl CapturedBody {
    /// Persisted form. Raw text wraps as a single-element array so the
    /// column is always valid JSON.
    fn into_value(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::RawText(text) => Value::Array(vec![Value::String(text)]),
        }
    }
}

/// Empty bodies record as null.
fn capture_response_body(bytes: &[u8]) -> Option<CapturedBody> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(v) => Some(CapturedBody::Json(v)),
        Err(_) => Some(CapturedBody::RawText(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
    }
}

/// The configured header subset as a JSON object; headers the request did
/// not carry map to null.
fn logged_headers(all: &[(String, String)], allowlist: &[String]) -> Value {
    let mut map = serde_json::Map::new();
    for name in allowlist {
        let value = all
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| Value::String(v.clone()))
            .unwrap_or(Value::Null);
        map.insert(name.clone(), value);
    }
    Value::Object(map)
}

fn content_type_is_json(headers: &[(String, String)]) -> bool {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

/// Forwarded-for wins over the socket address; both may be absent in tests.
fn client_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Keep the trailing `width` characters, respecting char boundaries.
fn tail(s: &str, width: usize) -> String {
    let count = s.chars().count();
    if count <= width {
        s.to_string()
    } else {
        s.chars().skip(count - width).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_fixed_width_hex() {
        let id = new_request_id();
        assert_eq!(id.len(), 14);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_request_id(), new_request_id());
    }

    #[tokio::test]
    async fn test_buffer_body_over_cap_passes_bytes_through() {
        let body = Body::from(vec![0x61u8; MAX_CAPTURED_BODY + 1]);
        let (body, captured) = buffer_body(body).await;
        assert_eq!(captured, None);
        let drained = axum::body::to_bytes(body, MAX_CAPTURED_BODY + 1024)
            .await
            .unwrap();
        assert_eq!(drained.len(), MAX_CAPTURED_BODY + 1);
    }

    #[tokio::test]
    async fn test_buffer_body_within_cap_captures_copy() {
        let (body, captured) = buffer_body(Body::from("hello")).await;
        assert_eq!(captured.as_deref(), Some(b"hello".as_slice()));
        let drained = axum::body::to_bytes(body, 1024).await.unwrap();
        assert_eq!(&drained[..], b"hello");
    }

    #[test]
    fn test_capture_response_body_variants() {
        assert_eq!(capture_response_body(b""), None);
        assert_eq!(
            capture_response_body(br#"{"ok":true}"#),
            Some(CapturedBody::Json(serde_json::json!({"ok": true})))
        );
        assert_eq!(
            capture_response_body(b"plain text"),
            Some(CapturedBody::RawText("plain text".to_string()))
        );
        assert_eq!(
            CapturedBody::RawText("plain text".to_string()).into_value(),
            serde_json::json!(["plain text"])
        );
    }

    #[test]
    fn test_logged_headers_include_nulls_for_missing() {
        let all = vec![("user-agent".to_string(), "test/1".to_string())];
        let allow = vec!["x-authorization".to_string(), "user-agent".to_string()];
        let logged = logged_headers(&all, &allow);
        assert!(logged["x-authorization"].is_null());
        assert_eq!(logged["user-agent"], "test/1");
        // Allowlist order is preserved.
        let keys: Vec<&String> = logged.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["x-authorization", "user-agent"]);
    }

    #[test]
    fn test_content_type_detection() {
        let json = vec![(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        )];
        let form = vec![(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        )];
        assert!(content_type_is_json(&json));
        assert!(!content_type_is_json(&form));
        assert!(!content_type_is_json(&[]));
    }

    #[test]
    fn test_tail_truncates_from_left() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        let long = "x".repeat(300);
        assert_eq!(tail(&long, COLUMN_WIDTH).len(), COLUMN_WIDTH);
    }
}
