use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use wiretap::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Serve installs its own subscriber inside start_server; everything else
    // gets tracing here.
    if !matches!(args.get_command(), cli::Commands::Serve) {
        init_tracing();
    }

    match args.get_command() {
        cli::Commands::Serve => {
            commands::serve::execute(&args.config).await?;
        }
        cli::Commands::Check => {
            commands::check::execute(&args.config)?;
        }
        cli::Commands::Stats { hours } => {
            commands::stats::execute(&args.config, hours).await?;
        }
        cli::Commands::Keys { action } => match action {
            cli::KeyCommands::Generate { name } => {
                commands::keys::generate(&args.config, name).await?;
            }
            cli::KeyCommands::List => {
                commands::keys::list(&args.config).await?;
            }
            cli::KeyCommands::Delete { name } => {
                commands::keys::delete(&args.config, &name).await?;
            }
        },
        cli::Commands::Version => {
            println!("wiretap v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
