//! Command-line interface for strictly_sockets.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Sockets - two-player tic-tac-toe over TCP
#[derive(Parser, Debug)]
#[command(name = "strictly_sockets")]
#[command(about = "Tic-tac-toe server and client speaking a compact binary protocol", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game server
    Server(Endpoint),

    /// Connect to a server and play from the terminal
    Client(Endpoint),
}

/// Address and config flags shared by both commands.
///
/// Flags left unset fall back to the config file, then to `127.0.0.1:8080`.
#[derive(Args, Debug, Clone, Default)]
pub struct Endpoint {
    /// Host to bind (server) or connect to (client)
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_flags() {
        let cli = Cli::try_parse_from(["strictly_sockets", "server", "--port", "9000"]).unwrap();
        let Command::Server(endpoint) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(endpoint.port, Some(9000));
        assert_eq!(endpoint.host, None);
        assert_eq!(endpoint.config, None);
    }

    #[test]
    fn test_client_flags() {
        let cli = Cli::try_parse_from([
            "strictly_sockets",
            "client",
            "--host",
            "10.0.0.2",
            "-c",
            "game.toml",
        ])
        .unwrap();
        let Command::Client(endpoint) = cli.command else {
            panic!("expected client command");
        };
        assert_eq!(endpoint.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(endpoint.config, Some(PathBuf::from("game.toml")));
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["strictly_sockets"]).is_err());
    }
}
