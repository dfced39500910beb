use anyhow::Result;
use axum::{extract::DefaultBodyLimit, middleware, routing::get, Json, Router};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    cleanup,
    config::Config,
    handlers,
    recorder::{self, RecorderState},
    writer::LogWriter,
};

/// Buffered log jobs the writer can hold before enqueue starts reporting drops.
const WRITER_BUFFER: usize = 10000;

/// Start the standalone server: the read API plus a health endpoint, with
/// the recorder layered over its own traffic.
///
/// This function:
/// 1. Opens the SQLite store and runs migrations
/// 2. Spawns the background log writer and the retention task
/// 3. Binds to the configured address
/// 4. Serves requests with graceful shutdown on ctrl-c
pub async fn start_server(config: Config) -> Result<()> {
    crate::init_tracing();
    info!("wiretap starting...");

    let pool = init_pool(&config.database.path).await?;
    let writer = LogWriter::new(pool.clone(), WRITER_BUFFER);
    info!(buffer = WRITER_BUFFER, "log writer initialized");

    if config.retention.enabled {
        cleanup::start_cleanup_task(pool.clone(), config.retention.clone());
        info!(
            days = config.retention.days,
            hour = config.retention.cleanup_hour,
            "retention task started"
        );
    }

    let app = create_router(&config, pool, writer);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    info!("Starting wiretap on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Open (creating if missing) the SQLite store and bring the schema current.
pub async fn init_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    Ok(pool)
}

/// Assemble the full application: health, the key-gated read API, and the
/// recording middleware over all of it.
pub fn create_router(config: &Config, pool: SqlitePool, writer: LogWriter) -> Router {
    let recorder_state = RecorderState::new(&config.recorder, writer);

    Router::new()
        .route("/health", get(health_check))
        .merge(handlers::router(pool, config.api.default_page_size))
        .layer(middleware::from_fn_with_state(
            recorder_state,
            recorder::record,
        ))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
