use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use std::path::Path;

use wiretap::{config, server, stats::Window};

/// Execute the stats command
///
/// Prints per-endpoint aggregates for the trailing window as a table.
pub async fn execute(config_path: &Path, hours: i64) -> Result<()> {
    let cfg = config::load_config(&config_path.to_string_lossy())?;
    let pool = server::init_pool(&cfg.database.path).await?;

    let window = Window::parse(hours, "hours")?;
    let rows = wiretap::stats::compute(&pool, &window).await?;

    if rows.is_empty() {
        println!("Endpoint Stats (Last {} Hours): No data available", hours);
        return Ok(());
    }

    println!("Endpoint Stats (Last {} Hours):", hours);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("METHOD").fg(Color::Cyan),
        Cell::new("ENDPOINT").fg(Color::Cyan),
        Cell::new("REQUESTS").fg(Color::Cyan),
        Cell::new("SUCCESS").fg(Color::Cyan),
        Cell::new("AVG SECONDS").fg(Color::Cyan),
        Cell::new("STATUSES").fg(Color::Cyan),
    ]);

    for stat in &rows {
        let statuses = stat
            .responses
            .iter()
            .map(|r| format!("{}:{}", r.response_status, r.total))
            .collect::<Vec<_>>()
            .join(" ");
        table.add_row(vec![
            Cell::new(&stat.method),
            Cell::new(&stat.endpoint),
            Cell::new(stat.total),
            Cell::new(format!("{}%", stat.successes_percent)),
            Cell::new(format!("{:.5}", stat.average_elapsed_seconds)),
            Cell::new(statuses),
        ]);
    }
    println!("{table}");
    Ok(())
}
