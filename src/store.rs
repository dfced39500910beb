use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::model::{RequestRecord, TraceEntry};
use crate::trace::CallSite;

/// Insert one finished request record.
pub async fn insert_request(pool: &SqlitePool, record: &RequestRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO requests (
            request_id, method, endpoint, url, response_status, response_status_text,
            request_headers, request_body, response_body,
            user_id, user_ip, curl_repro, elapsed_seconds, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&record.request_id)
    .bind(&record.method)
    .bind(&record.endpoint)
    .bind(&record.url)
    .bind(record.response_status)
    .bind(&record.response_status_text)
    .bind(record.request_headers.as_ref().map(|v| v.to_string()))
    .bind(record.request_body.as_ref().map(|v| v.to_string()))
    .bind(record.response_body.as_ref().map(|v| v.to_string()))
    .bind(record.user_id)
    .bind(&record.user_ip)
    .bind(&record.curl_repro)
    .bind(record.elapsed_seconds)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a drained trace stack as one batch. Callers skip empty batches.
pub async fn insert_trace_batch(
    pool: &SqlitePool,
    entries: &[TraceEntry],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO trace_entries (
                request_id, sequence, user_id, file, function, line,
                elapsed_seconds, message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.request_id)
        .bind(entry.sequence)
        .bind(entry.user_id)
        .bind(&entry.file)
        .bind(&entry.function)
        .bind(entry.line)
        .bind(entry.elapsed_seconds)
        .bind(&entry.message)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

/// Append one entry for a request outside its original context. The sequence
/// is read-and-incremented inside the INSERT itself; SQLite runs one writer
/// at a time, so two racing appends starting from max K get K+1 and K+2.
pub async fn append_deferred_entry(
    pool: &SqlitePool,
    request_id: &str,
    site: CallSite,
    message: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO trace_entries (
            request_id, sequence, user_id, file, function, line,
            elapsed_seconds, message, created_at
        )
        SELECT ?1, COALESCE(MAX(sequence), 0) + 1, NULL, ?2, ?3, ?4, NULL, ?5, ?6
        FROM trace_entries
        WHERE request_id = ?1
        "#,
    )
    .bind(request_id)
    .bind(site.file)
    .bind(site.function)
    .bind(site.line as i64)
    .bind(message)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Administrative credential for the read API. The key value is hidden from
/// serialization; only the CLI shows it, once, at generation time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiKey {
    pub name: String,
    #[serde(skip_serializing)]
    pub key: String,
    pub created_at: DateTime<Utc>,
}

/// True when some stored key matches the presented value exactly.
pub async fn api_key_exists(pool: &SqlitePool, key: &str) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE key = ?1")
        .bind(key)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn api_key_name_exists(pool: &SqlitePool, name: &str) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE name = ?1")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn create_api_key(pool: &SqlitePool, name: &str, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO api_keys (name, key, created_at) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(key)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_api_keys(pool: &SqlitePool) -> Result<Vec<ApiKey>, sqlx::Error> {
    sqlx::query_as("SELECT name, key, created_at FROM api_keys ORDER BY created_at")
        .fetch_all(pool)
        .await
}

/// Delete one key by name. Returns the number of rows removed.
pub async fn delete_api_key(pool: &SqlitePool, name: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM api_keys WHERE name = ?1")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
