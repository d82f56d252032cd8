//! Strictly Sockets - unified CLI
//!
//! Runs either the game server or a terminal client.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, Endpoint};
use strictly_sockets::{ClientConfig, GameServer, ServerConfig, Settings};
use tokio::sync::watch;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr so the client's board stays alone on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Server(endpoint) => run_server(endpoint).await,
        Command::Client(endpoint) => run_client(endpoint).await,
    }
}

/// Merges the config file with command-line overrides.
fn load_configs(endpoint: &Endpoint) -> Result<(ServerConfig, ClientConfig)> {
    let (mut server, mut client) = Settings::load(endpoint.config.as_deref())
        .context("Error loading configuration")?
        .into_parts();

    if let Some(host) = &endpoint.host {
        server = server.with_host(host.clone());
        client = client.with_host(host.clone());
    }
    if let Some(port) = endpoint.port {
        server = server.with_port(port);
        client = client.with_port(port);
    }
    Ok((server, client))
}

/// Run the game server until Ctrl-C
#[instrument(skip_all)]
async fn run_server(endpoint: Endpoint) -> Result<()> {
    let (config, _) = load_configs(&endpoint)?;
    info!(address = %config.address(), "Starting Strictly Sockets server");

    let server = GameServer::bind(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the server too.
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(shutdown_rx).await?;
    info!("Server stopped");
    Ok(())
}

/// Run the terminal client for one game
#[instrument(skip_all)]
async fn run_client(endpoint: Endpoint) -> Result<()> {
    let (_, config) = load_configs(&endpoint)?;
    let end = strictly_sockets::client::run(config).await?;
    info!(%end, "Client finished");
    Ok(())
}
