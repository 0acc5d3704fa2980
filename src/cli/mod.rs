pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "monk-realtime")]
#[command(about = "Monk Realtime - authorization gateway for realtime channels")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the gateway HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides REALTIME_PORT)")]
        port: Option<u16>,

        #[arg(long, help = "Do not run the periodic connection sweep")]
        no_sweep: bool,
    },

    #[command(about = "Mark lapsed connections stale and remove expired ones, once")]
    Sweep,

    #[command(about = "Report realtime notify triggers in a tenant database")]
    CheckTriggers {
        #[arg(long, help = "Tenant identifier (tenant_<name> or short id)")]
        tenant: String,

        #[arg(long = "table", help = "Table to check (repeatable; default all public tables)")]
        tables: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command.unwrap_or(Commands::Serve { port: None, no_sweep: false }) {
        Commands::Serve { port, no_sweep } => commands::serve::handle(config, port, !no_sweep).await,
        Commands::Sweep => commands::sweep::handle(config, output_format).await,
        Commands::CheckTriggers { tenant, tables } => {
            commands::triggers::handle(config, &tenant, &tables, output_format).await
        }
    }
}
