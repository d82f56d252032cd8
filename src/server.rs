//! TCP transport for the game server.
//!
//! Architecture: one accept loop plus one task per connection.
//!
//! - **Accept loop**: admits each new stream through the [`Coordinator`] and
//!   spawns its connection task. Refused streams are closed immediately.
//! - **Reader** (inside the connection task): reads whole frames and hands
//!   them to the coordinator, which runs the turn machine under its lock.
//! - **Writer** (spawned per connection): drains the session's outbox onto
//!   the socket. Each write is bounded by the configured timeout, so a stalled
//!   peer only ever blocks its own writer.
//!
//! A session ends when its reader fails, its writer fails, or the
//! coordinator drops the session's outbox (game over, quit, opponent gone,
//! shutdown). In every case the slot is released and the socket closed.
//!
//! Shutdown: a `watch` channel flips to `true`; the accept loop stops, the
//! coordinator tells every player and drops their outboxes, and the loop
//! waits for the connection tasks to flush and exit.

use crate::config::ServerConfig;
use crate::protocol::{Message, read_frame, write_message};
use crate::session::{Admission, AdmissionError, Coordinator};
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Bound game server.
#[derive(Debug)]
pub struct GameServer {
    listener: TcpListener,
    coordinator: Coordinator,
    config: ServerConfig,
}

impl GameServer {
    /// Binds the listening socket.
    #[instrument(skip(config), fields(address = %config.address()))]
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.address())
            .await
            .with_context(|| format!("Error on binding {}", config.address()))?;
        info!(address = %listener.local_addr()?, "Server listening");
        Ok(Self {
            listener,
            coordinator: Coordinator::new(),
            config,
        })
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared coordinator handle.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Accepts connections until `shutdown` turns `true` or its sender is
    /// dropped.
    ///
    /// An accept failure is fatal and returned to the caller.
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.context("Error on accept")?;
                    debug!(%peer, "Connection accepted");
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        self.coordinator.clone(),
                        self.config.clone(),
                    ));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            // Reap finished connection tasks so the set does not grow.
            while connections.try_join_next().is_some() {}
        }

        info!("Shutting down server");
        self.coordinator.shutdown();
        while connections.join_next().await.is_some() {}
        info!("All sessions closed");
        Ok(())
    }
}

/// Drives one connection from admission to close.
#[instrument(skip(stream, coordinator, config))]
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    coordinator: Coordinator,
    config: ServerConfig,
) {
    let (outbox, queued) = mpsc::unbounded_channel();

    let admission = match coordinator.admit(outbox) {
        Ok(admission) => admission,
        Err(AdmissionError::ServerFull) => {
            warn!("Connection refused: server full");
            if *config.notify_full() {
                let notice = Message::ServerFull;
                let write = write_message(&mut stream, &notice);
                if tokio::time::timeout(config.write_timeout(), write).await.is_err() {
                    debug!("ServerFull notice timed out");
                }
            }
            return;
        }
    };
    info!(player = %admission.player, session = admission.session, "Session started");

    let (mut reader, writer) = stream.into_split();
    let mut writer_task = tokio::spawn(write_loop(writer, queued, config.write_timeout()));

    let writer_finished = tokio::select! {
        err = read_loop(&mut reader, &coordinator, &admission) => {
            info!(player = %admission.player, error = %err, "Player disconnected");
            false
        }
        joined = &mut writer_task => {
            match joined {
                Ok(Ok(())) => debug!("Session closed by server"),
                Ok(Err(e)) => warn!(error = %e, "Write failed"),
                Err(e) => error!(error = %e, "Writer task failed"),
            }
            true
        }
    };

    coordinator.disconnect(&admission);

    // Releasing the slot dropped the outbox; the writer flushes what was
    // queued before that and exits.
    if !writer_finished {
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Write failed after disconnect"),
            Err(e) => error!(error = %e, "Writer task failed"),
        }
    }
    info!(player = %admission.player, "Session ended");
}

/// Feeds frames to the coordinator until the stream fails.
async fn read_loop(
    reader: &mut OwnedReadHalf,
    coordinator: &Coordinator,
    admission: &Admission,
) -> io::Error {
    loop {
        match read_frame(reader).await {
            Ok(frame) => coordinator.handle_frame(admission, &frame),
            Err(e) => return e,
        }
    }
}

/// Writes queued messages until the outbox closes, then shuts the write side.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queued: UnboundedReceiver<Message>,
    timeout: Duration,
) -> io::Result<()> {
    while let Some(message) = queued.recv().await {
        tokio::time::timeout(timeout, write_message(&mut writer, &message))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))??;
    }
    writer.shutdown().await
}
