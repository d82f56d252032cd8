//! Terminal client.
//!
//! [`ClientSession`] turns server messages into text and tells the loop
//! whether to wait, prompt, or stop. [`play`] wires it to a connection and a
//! line-based input source; [`run`] does the same for a real socket, stdin
//! and stdout.

use crate::config::ClientConfig;
use crate::protocol::{Frame, Message, MoveStatus, read_frame, write_message};
use anyhow::{Context, Result};
use derive_getters::Getters;
use derive_more::{Display, Error};
use std::io::Write;
use strictly_tictactoe::{Board, Player};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// Shown whenever a move is expected.
pub const PROMPT: &str = "Enter a square (1-9) or q to quit: ";

/// One line of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Cell index 0-8.
    Move(u8),
    /// Leave the game.
    Quit,
}

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum InputError {
    /// Blank line.
    #[display("No input, enter 1-9 or q")]
    Empty,
    /// Not a number.
    #[display("Not a square: {input}")]
    NotNumeric {
        /// What was typed.
        input: String,
    },
    /// Number outside 1-9.
    #[display("Square {value} is outside 1-9")]
    OutOfRange {
        /// What was typed.
        value: u32,
    },
}

/// Parses a line: `1`-`9` picks a cell, `q` quits.
pub fn parse_input(line: &str) -> Result<Input, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(InputError::Empty);
    }
    if line.eq_ignore_ascii_case("q") {
        return Ok(Input::Quit);
    }
    let value: u32 = line.parse().map_err(|_| InputError::NotNumeric {
        input: line.to_string(),
    })?;
    match value {
        1..=9 => Ok(Input::Move((value - 1) as u8)),
        _ => Err(InputError::OutOfRange { value }),
    }
}

/// How a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum GameEnd {
    /// We completed a line.
    #[display("won")]
    Won,
    /// The opponent completed a line.
    #[display("lost")]
    Lost,
    /// Full board.
    #[display("draw")]
    Draw,
    /// We left.
    #[display("quit")]
    Quit,
    /// Server had no free slot.
    #[display("refused")]
    Refused,
    /// Connection closed without a result.
    #[display("disconnected")]
    Disconnected,
}

/// What the loop does after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Keep reading.
    Wait,
    /// Ask the user for a move.
    Prompt,
    /// Stop.
    Finish(GameEnd),
}

/// Reaction to one server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Text to show, if any.
    pub notice: Option<String>,
    /// Next step.
    pub next: Next,
}

impl Reaction {
    fn wait(notice: impl Into<String>) -> Self {
        Self {
            notice: Some(notice.into()),
            next: Next::Wait,
        }
    }

    fn silent() -> Self {
        Self {
            notice: None,
            next: Next::Wait,
        }
    }
}

/// Client-side view of the game.
#[derive(Debug, Clone, Default, Getters)]
pub struct ClientSession {
    /// Our identity once welcomed.
    player: Option<Player>,
    /// Last board received.
    board: Board,
}

impl ClientSession {
    /// Creates an unwelcomed session with an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates local state and decides what to show and do next.
    #[instrument(level = "debug", skip(self), fields(player = ?self.player))]
    pub fn on_message(&mut self, message: &Message) -> Reaction {
        match message {
            Message::Welcome(player) => {
                self.player = Some(*player);
                Reaction::wait(format!("Connected as player {player}"))
            }
            Message::ServerFull => Reaction {
                notice: Some("Server is full, try again later".to_string()),
                next: Next::Finish(GameEnd::Refused),
            },
            Message::BoardUpdate(board) => {
                self.board = board.clone();
                Reaction::wait(board.display())
            }
            Message::Turn(active) if self.player == Some(*active) => Reaction {
                notice: Some(format!("Your turn (player {active})")),
                next: Next::Prompt,
            },
            Message::Turn(active) => Reaction::wait(format!("Waiting for player {active}...")),
            Message::MoveResult(MoveStatus::Accepted) => Reaction::silent(),
            Message::MoveResult(MoveStatus::Rejected) => Reaction {
                notice: Some("Move rejected, pick an empty square".to_string()),
                next: Next::Prompt,
            },
            Message::Win(winner) if self.player == Some(*winner) => Reaction {
                notice: Some("You win!".to_string()),
                next: Next::Finish(GameEnd::Won),
            },
            Message::Win(winner) => Reaction {
                notice: Some(format!("Player {winner} wins. You lose.")),
                next: Next::Finish(GameEnd::Lost),
            },
            Message::Draw => Reaction {
                notice: Some("It's a draw".to_string()),
                next: Next::Finish(GameEnd::Draw),
            },
            Message::Error(text) => Reaction::wait(format!("Server: {text}")),
            Message::MoveRequest(_) | Message::QuitRequest => {
                warn!(kind = %message.kind(), "Client-bound message of request type");
                Reaction::silent()
            }
        }
    }
}

/// Plays one game over `stream`, reading moves from `input` and writing the
/// display to `out`.
///
/// Input is only read while a move is expected; input EOF counts as quitting.
/// `quit` turning `true` sends `QuitRequest` and returns.
pub async fn play<S, I, W>(
    stream: S,
    input: I,
    out: &mut W,
    mut quit: watch::Receiver<bool>,
) -> Result<GameEnd>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    I: AsyncBufRead + Unpin,
    W: Write,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Frames are read in their own task so a partial frame is never lost
    // when another branch wins the select.
    let (frames_tx, mut frames) = mpsc::unbounded_channel::<Frame>();
    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(frame) => {
                    if frames_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Read side closed");
                    break;
                }
            }
        }
    });

    let mut lines = input.lines();
    let mut session = ClientSession::new();
    let mut prompting = false;
    let mut quit_armed = true;

    let end = loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    info!("Connection closed by server");
                    writeln!(out, "Disconnected from server")?;
                    break GameEnd::Disconnected;
                };
                let message = match frame.message() {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed frame");
                        continue;
                    }
                };
                let reaction = session.on_message(&message);
                if let Some(notice) = &reaction.notice {
                    writeln!(out, "{notice}")?;
                }
                match reaction.next {
                    Next::Wait => {}
                    Next::Prompt => {
                        prompting = true;
                        write!(out, "{PROMPT}")?;
                        out.flush()?;
                    }
                    Next::Finish(end) => break end,
                }
            }
            line = lines.next_line(), if prompting => {
                let line = line.context("Error reading input")?;
                let input = match line {
                    Some(line) => parse_input(&line),
                    None => Ok(Input::Quit),
                };
                match input {
                    Ok(Input::Move(pos)) => {
                        debug!(position = pos, "Sending move");
                        write_message(&mut writer, &Message::MoveRequest(pos))
                            .await
                            .context("Error sending move")?;
                        prompting = false;
                    }
                    Ok(Input::Quit) => {
                        send_quit(&mut writer).await;
                        break GameEnd::Quit;
                    }
                    Err(e) => {
                        writeln!(out, "{e}")?;
                        write!(out, "{PROMPT}")?;
                        out.flush()?;
                    }
                }
            }
            changed = quit.changed(), if quit_armed => {
                if changed.is_err() {
                    quit_armed = false;
                } else if *quit.borrow_and_update() {
                    writeln!(out)?;
                    send_quit(&mut writer).await;
                    break GameEnd::Quit;
                }
            }
        }
    };

    reader_task.abort();
    info!(%end, "Game finished");
    Ok(end)
}

async fn send_quit<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_message(writer, &Message::QuitRequest).await {
        debug!(error = %e, "Could not send quit");
    }
}

/// Connects to the server and plays on stdin/stdout until the game ends.
///
/// Ctrl-C sends `QuitRequest` before returning.
#[instrument(skip(config), fields(address = %config.address()))]
pub async fn run(config: ClientConfig) -> Result<GameEnd> {
    let stream = TcpStream::connect(config.address())
        .await
        .with_context(|| format!("Error connecting to server at {}", config.address()))?;
    info!("Connected to server");

    let (quit_tx, quit_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit_tx.send(true);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    play(stream, stdin, &mut std::io::stdout(), quit_rx).await
}
