//! Main entry point for the sipbell CLI
//!
//! Registers with a registrar or listens for inbound calls using
//! `sipbell-client-core`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sipbell_client_core::{Client, ClientConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// sipbell SIP user agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with client settings
    #[arg(short, long, env = "SIPBELL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register once with a registrar
    Register {
        /// Registrar host
        #[arg(long)]
        registrar: String,

        #[arg(long, default_value_t = 5060)]
        registrar_port: u16,

        /// Host advertised in Via and Contact
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 5070)]
        port: u16,

        #[arg(short, long)]
        username: String,

        /// Omit to register without credentials
        #[arg(short, long, env = "SIPBELL_PASSWORD")]
        password: Option<String>,
    },

    /// Accept inbound calls until interrupted
    Listen {
        /// Transport; the configured default when omitted
        #[arg(short, long, default_value = "")]
        transport: String,

        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value_t = 5060)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(
                    "sipbell=info,sipbell_client_core=info,sipbell_dialog_core=info,sipbell_sip_transport=info",
                )
            }),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let client = Client::new(config);

    match cli.command {
        Command::Register {
            registrar,
            registrar_port,
            host,
            port,
            username,
            password,
        } => {
            commands::register::execute(
                &client,
                &registrar,
                registrar_port,
                &host,
                port,
                &username,
                password.as_deref(),
            )
            .await
        }
        Command::Listen {
            transport,
            host,
            port,
        } => commands::listen::execute(&client, &transport, &host, port).await,
    }
}
