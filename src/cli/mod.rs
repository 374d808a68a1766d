pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "doc-gateway")]
#[command(about = "Policy-enforcing HTTP gateway for schema-less document collections")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP gateway (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides PORT)")]
        port: Option<u16>,
        #[arg(long, help = "YAML policy file; built-in demo policies when omitted")]
        policies: Option<PathBuf>,
    },

    #[command(about = "Validate a policy file and list its bindings")]
    Check {
        #[arg(long, help = "YAML policy file")]
        policies: PathBuf,
    },

    #[command(about = "Mint a development JWT with the configured secret")]
    Token {
        #[arg(long, help = "User name carried in the token")]
        user: String,
        #[arg(long, help = "Optional user id claim")]
        user_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
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

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command.unwrap_or(Commands::Serve { port: None, policies: None }) {
        Commands::Serve { port, policies } => commands::serve::handle(port, policies).await,
        Commands::Check { policies } => commands::check::handle(&policies, output_format),
        Commands::Token { user, user_id } => commands::token::handle(user, user_id, output_format),
    }
}
