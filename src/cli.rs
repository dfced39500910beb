use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wiretap", version, about = "Request logging and diagnostics for HTTP services")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "wiretap.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the standalone server (default)
    Serve,

    /// Test configuration file validity
    Check,

    /// Show per-endpoint statistics for a recent window
    Stats {
        /// Number of hours to analyze (default: 24)
        #[arg(short = 'n', long, default_value = "24")]
        hours: i64,
    },

    /// Manage read-API keys
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeyCommands {
    /// Generate a new api key
    Generate {
        /// Key name; a readable name is generated if omitted
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List all api keys
    List,

    /// Delete one key by name
    Delete {
        /// Name of the key to delete
        name: String,
    },
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
