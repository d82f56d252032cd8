//! Strictly Sockets library - two-player tic-tac-toe over TCP
//!
//! Frames carry a one-byte message type and a one-byte payload length,
//! followed by up to 255 payload bytes.
//!
//! # Architecture
//!
//! - **Protocol**: header codec, typed messages, async frame I/O
//! - **Turn**: pure state machine deciding replies and broadcasts
//! - **Session**: the two player slots and the shared game behind one lock
//! - **Server**: accept loop and per-connection reader/writer tasks
//! - **Client**: terminal player
//!
//! Board rules live in the `strictly_tictactoe` crate.
//!
//! # Example
//!
//! ```no_run
//! use strictly_sockets::{GameServer, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = GameServer::bind(ServerConfig::default().with_port(0)).await?;
//! println!("listening on {}", server.local_addr()?);
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! server.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod client;
mod config;
pub mod protocol;
mod server;
mod session;
mod turn;

// Crate-level exports - Configuration
pub use config::{ClientConfig, ConfigError, DEFAULT_HOST, DEFAULT_PORT, ServerConfig, Settings};

// Crate-level exports - Server
pub use server::GameServer;

// Crate-level exports - Session coordination
pub use session::{Admission, AdmissionError, Coordinator, SHUTTING_DOWN, SessionId};

// Crate-level exports - Turn state machine
pub use turn::{
    Effect, MALFORMED_MOVE, NOT_YOUR_TURN, OPPONENT_DISCONNECTED, Outcome, Recipient,
    TurnMachine, TurnState, UNEXPECTED_MESSAGE,
};

// Crate-level exports - Client
pub use client::{ClientSession, GameEnd, Input, InputError, parse_input};

// Crate-level exports - Game types
pub use strictly_tictactoe::{Board, Player, Square};
