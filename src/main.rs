use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use relboard::config::{CliOverrides, RelboardConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "relboard")]
#[command(version, about = "Release schedule dashboard")]
pub struct Cli {
    /// Path to relboard.toml (defaults to ./relboard.toml when present)
    #[arg(short, long, global = true, env = "RELBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive, e.g. "debug" or "relboard=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the dashboard, JSON API and live WebSocket feed
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Open the dashboard in a browser once the server is up
        #[arg(long)]
        open: bool,

        /// Enable dev mode (CORS permissive for a separately served frontend)
        #[arg(long)]
        dev: bool,

        /// Initialize database only (don't start server)
        #[arg(long)]
        init: bool,
    },
    /// Print every product's milestones and their current status
    Timeline {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Evaluate as of this date (YYYY-MM-DD) instead of now
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Print the dashboard as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides {
            log_level: self.log_level.clone(),
            ..Default::default()
        };
        match &self.command {
            Commands::Serve {
                port,
                host,
                db_path,
                dev,
                ..
            } => {
                overrides.port = *port;
                overrides.host = host.clone();
                overrides.db_path = db_path.clone();
                overrides.dev_mode = *dev;
            }
            Commands::Timeline { db_path, .. } => {
                overrides.db_path = db_path.clone();
            }
            Commands::Config { .. } => {}
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = RelboardConfig::resolve(cli.config.as_deref(), &cli.overrides())?;
    let _log_guard = relboard::logging::init_logging(&config.logging)?;

    match &cli.command {
        Commands::Serve { open, init, .. } => cmd::cmd_serve(config, *init, *open).await?,
        Commands::Timeline { date, json, .. } => cmd::cmd_timeline(&config, *date, *json)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
