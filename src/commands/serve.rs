use anyhow::Result;
use std::path::Path;

use wiretap::{config, server};

/// Execute the serve command
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(&config_path.to_string_lossy())?;
    server::start_server(cfg).await
}
