use futures::FutureExt;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::model::{RequestRecord, TraceEntry};
use crate::store;

/// One finished request with its drained trace stack, handed to the writer
/// as a single logical unit.
#[derive(Debug)]
pub struct LogJob {
    pub record: RequestRecord,
    pub entries: Vec<TraceEntry>,
}

/// Async log writer with channel-based persistence.
///
/// An MPSC channel decouples request handling from database writes: the
/// recorder enqueues and returns, the background task inserts. Write
/// failures are logged and swallowed so they never surface to the request
/// being recorded.
#[derive(Clone)]
pub struct LogWriter {
    tx: mpsc::Sender<LogJob>,
}

impl LogWriter {
    /// Spawn the background writer task over `pool` with the given channel
    /// buffer. A full buffer applies backpressure to the recorder.
    pub fn new(pool: SqlitePool, buffer_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<LogJob>(buffer_size);

        tokio::spawn(async move {
            let result = std::panic::AssertUnwindSafe(async {
                while let Some(job) = rx.recv().await {
                    Self::write_job(&pool, job).await;
                }
            })
            .catch_unwind()
            .await;
            match result {
                Ok(()) => tracing::warn!("log writer exited: channel closed"),
                Err(e) => tracing::error!(panic = ?e, "log writer panicked"),
            }
        });

        Self { tx }
    }

    /// Enqueue a finished request. Non-blocking apart from channel
    /// backpressure; a closed channel is logged and dropped.
    pub async fn enqueue(&self, job: LogJob) {
        if let Err(e) = self.tx.send(job).await {
            tracing::error!(error = %e, "failed to enqueue request log");
        }
    }

    /// Record first, then the entry batch. The two are one unit for
    /// observability but not transactionally atomic: a record without its
    /// entries is an accepted degraded outcome.
    async fn write_job(pool: &SqlitePool, job: LogJob) {
        if let Err(e) = store::insert_request(pool, &job.record).await {
            tracing::error!(
                request_id = %job.record.request_id,
                error = %e,
                "failed to write request record"
            );
            return;
        }

        if job.entries.is_empty() {
            return;
        }
        if let Err(e) = store::insert_trace_batch(pool, &job.entries).await {
            tracing::error!(
                request_id = %job.record.request_id,
                error = %e,
                "failed to write trace entries"
            );
        }
    }
}
