pub mod auth;
pub mod cleanup;
pub mod config;
pub mod curl;
pub mod error;
pub mod handlers;
pub mod model;
pub mod reader;
pub mod recorder;
pub mod redact;
pub mod server;
pub mod stats;
pub mod store;
pub mod trace;
pub mod writer;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
