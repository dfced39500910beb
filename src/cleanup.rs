use std::time::Duration as StdDuration;

use chrono::{Duration, Timelike, Utc};
use sqlx::SqlitePool;
use tokio::time::interval;

use crate::config::RetentionConfig;

/// Start the retention task.
///
/// Ticks hourly and, during the configured cleanup hour, deletes request
/// records and their trace entries older than the retention window.
pub fn start_cleanup_task(
    pool: SqlitePool,
    config: RetentionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(StdDuration::from_secs(3600));

        loop {
            interval.tick().await;

            if !should_run_cleanup(&config) {
                continue;
            }

            match cleanup_expired(&pool, config.days).await {
                Ok((requests, entries)) => {
                    if requests > 0 || entries > 0 {
                        tracing::info!(
                            requests,
                            trace_entries = entries,
                            retention_days = config.days,
                            "deleted expired request logs"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "retention cleanup failed");
                }
            }
        }
    })
}

fn should_run_cleanup(config: &RetentionConfig) -> bool {
    config.enabled && Utc::now().hour() as u8 == config.cleanup_hour
}

/// Delete everything older than `days`. Trace entries go first so a failure
/// between the two statements never leaves entries without their request.
pub async fn cleanup_expired(
    pool: &SqlitePool,
    days: u64,
) -> Result<(u64, u64), sqlx::Error> {
    let cutoff = Utc::now() - Duration::days(days as i64);

    let entries = sqlx::query(
        "DELETE FROM trace_entries WHERE request_id IN \
         (SELECT request_id FROM requests WHERE created_at < ?1)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?
    .rows_affected();

    let requests = sqlx::query("DELETE FROM requests WHERE created_at < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    Ok((requests, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestRecord, TraceEntry};
    use crate::store;

    fn record_at(request_id: &str, created_at: chrono::DateTime<Utc>) -> RequestRecord {
        RequestRecord {
            request_id: request_id.to_string(),
            method: "GET".to_string(),
            endpoint: "/ping".to_string(),
            url: Some("/ping".to_string()),
            response_status: 200,
            response_status_text: Some("OK".to_string()),
            request_headers: None,
            request_body: None,
            response_body: None,
            user_id: None,
            user_ip: None,
            curl_repro: None,
            elapsed_seconds: 0.001,
            created_at,
        }
    }

    fn entry_for(request_id: &str, created_at: chrono::DateTime<Utc>) -> TraceEntry {
        TraceEntry {
            request_id: request_id.to_string(),
            sequence: 1,
            user_id: None,
            file: None,
            function: None,
            line: None,
            elapsed_seconds: None,
            message: Some("checkpoint".to_string()),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_expired_rows() {
        let pool = store::tests::memory_pool().await;
        let old = Utc::now() - Duration::days(10);
        let fresh = Utc::now();

        store::insert_request(&pool, &record_at("aaaaaaaaaaaaaa", old))
            .await
            .unwrap();
        store::insert_trace_batch(&pool, &[entry_for("aaaaaaaaaaaaaa", old)])
            .await
            .unwrap();
        store::insert_request(&pool, &record_at("bbbbbbbbbbbbbb", fresh))
            .await
            .unwrap();
        store::insert_trace_batch(&pool, &[entry_for("bbbbbbbbbbbbbb", fresh)])
            .await
            .unwrap();

        let (requests, entries) = cleanup_expired(&pool, 7).await.unwrap();
        assert_eq!(requests, 1);
        assert_eq!(entries, 1);

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
        let (remaining_entries,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trace_entries WHERE request_id = 'bbbbbbbbbbbbbb'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining_entries, 1);
    }
}
