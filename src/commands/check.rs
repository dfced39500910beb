use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tracing::info;

use wiretap::config;

/// Execute the check command
///
/// This validates the configuration file without starting the server
pub fn execute(config_path: &Path) -> Result<()> {
    println!("Testing configuration...");
    info!("Loading and validating configuration");

    let cfg = config::load_config(&config_path.to_string_lossy())?;

    println!("{}", "✓ Configuration test successful".green());
    println!();

    println!("{}", "Configuration Summary:".bold());
    println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Database: {}", cfg.database.path);
    println!();

    let recorder_status = if cfg.recorder.enabled {
        "enabled".green()
    } else {
        "disabled".yellow()
    };
    println!("  Recorder: {}", recorder_status);
    println!(
        "    Stack timers: {}",
        if cfg.recorder.stack_timers_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("    Redacted keys: {}", cfg.recorder.password_keys().join(", "));
    println!("    Logged headers: {}", cfg.recorder.headers_to_log().join(", "));
    println!();

    println!("  Default page size: {}", cfg.api.default_page_size);
    if cfg.retention.enabled {
        println!(
            "  Retention: {} days, cleanup at {:02}:00 UTC",
            cfg.retention.days, cfg.retention.cleanup_hour
        );
    } else {
        println!("  Retention: {}", "disabled".yellow());
    }

    info!("Configuration validation completed successfully");
    Ok(())
}
