pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "club-tenancy")]
#[command(about = "Club Tenancy - per-tenant database routing server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides APP_PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Encrypt a tenant database password for the registry")]
    EncryptPassword {
        #[arg(long, help = "Password to encrypt; read from stdin when omitted")]
        plaintext: Option<String>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => commands::serve::handle(port).await,
        Commands::EncryptPassword { plaintext } => commands::encrypt::handle(plaintext),
    }
}
