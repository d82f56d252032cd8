//! Server-side turn state machine.
//!
//! The machine is pure: it takes decoded requests from a known player and
//! answers with an ordered list of [`Effect`]s. Delivering those effects to
//! sockets is the coordinator's job.

use crate::protocol::{Message, MessageError, MessageType, MoveStatus};
use strictly_tictactoe::{Game, Player};
use tracing::{debug, info, instrument, warn};

/// Reply for a move from the player who is not active.
pub const NOT_YOUR_TURN: &str = "Not your turn";
/// Reply for anything the current state does not accept.
pub const UNEXPECTED_MESSAGE: &str = "Unexpected message type";
/// Reply for a move request without a cell index.
pub const MALFORMED_MOVE: &str = "Malformed move request";
/// Sent to the remaining player when the opponent leaves mid-game.
pub const OPPONENT_DISCONNECTED: &str = "Opponent disconnected";

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Outcome {
    /// A player completed a line.
    #[display("{_0} wins")]
    Win(Player),
    /// Board full without a line.
    #[display("draw")]
    Draw,
    /// A player left before the end.
    #[display("abandoned")]
    Abandoned,
}

/// Protocol state of the single game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Fewer than two players connected.
    AwaitingPlayers,
    /// Waiting for the given player's move.
    AwaitingMove(Player),
    /// Terminal.
    GameOver(Outcome),
}

/// Who receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// A single player.
    Only(Player),
    /// Both players, X first.
    Both,
}

impl Recipient {
    /// Players addressed, in delivery order.
    pub fn players(self) -> impl Iterator<Item = Player> {
        let both = [Player::X, Player::O];
        let only = match self {
            Recipient::Only(player) => Some(player),
            Recipient::Both => None,
        };
        both.into_iter()
            .filter(move |p| only.is_none_or(|only| only == *p))
    }
}

/// Side effect requested by the machine, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Queue a message.
    Send {
        /// Target.
        to: Recipient,
        /// Payload.
        message: Message,
    },
    /// End the addressed sessions once their queued messages are sent.
    Close(Recipient),
}

impl Effect {
    fn send(to: Recipient, message: Message) -> Self {
        Effect::Send { to, message }
    }

    fn reply(player: Player, message: Message) -> Self {
        Effect::Send {
            to: Recipient::Only(player),
            message,
        }
    }
}

/// Turn state machine for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnMachine {
    game: Game,
    state: TurnState,
}

impl TurnMachine {
    /// Creates a machine waiting for players.
    #[instrument]
    pub fn new() -> Self {
        Self {
            game: Game::new(),
            state: TurnState::AwaitingPlayers,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The game being played.
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Discards the current game and waits for a new pair.
    #[instrument(skip(self), fields(state = ?self.state))]
    pub fn reset(&mut self) {
        info!("Resetting game");
        self.game.reset();
        self.state = TurnState::AwaitingPlayers;
    }

    /// Starts play once both players are present.
    ///
    /// Only the first call after [`TurnMachine::new`] or
    /// [`TurnMachine::reset`] does anything.
    #[instrument(skip(self), fields(state = ?self.state))]
    pub fn start(&mut self) -> Vec<Effect> {
        if self.state != TurnState::AwaitingPlayers {
            warn!("Start requested outside of AwaitingPlayers");
            return Vec::new();
        }

        let active = self.game.active_player();
        self.state = TurnState::AwaitingMove(active);
        info!(%active, "Game started");

        vec![
            Effect::send(Recipient::Both, Message::BoardUpdate(self.game.board().clone())),
            Effect::send(Recipient::Both, Message::Turn(active)),
        ]
    }

    /// Handles one decoded (or undecodable) frame from `from`.
    #[instrument(skip(self, message), fields(state = ?self.state))]
    pub fn handle(&mut self, from: Player, message: Result<Message, MessageError>) -> Vec<Effect> {
        match message {
            Ok(Message::MoveRequest(pos)) => self.move_request(from, pos),
            Ok(Message::QuitRequest) => {
                info!(%from, "Quit requested");
                vec![Effect::Close(Recipient::Only(from))]
            }
            Err(MessageError::MalformedPayload {
                kind: MessageType::MoveRequest,
                ..
            }) => {
                warn!(%from, "Malformed move request");
                vec![Effect::reply(from, Message::error(MALFORMED_MOVE))]
            }
            other => {
                debug!(%from, message = ?other, "Unexpected message");
                vec![Effect::reply(from, Message::error(UNEXPECTED_MESSAGE))]
            }
        }
    }

    /// Applies a move request from `from` for cell `pos`.
    #[instrument(skip(self), fields(state = ?self.state))]
    pub fn move_request(&mut self, from: Player, pos: u8) -> Vec<Effect> {
        let TurnState::AwaitingMove(active) = self.state else {
            debug!("Move outside of play");
            return vec![Effect::reply(from, Message::error(UNEXPECTED_MESSAGE))];
        };

        if from != active {
            warn!(%active, "Player tried to move out of turn");
            return vec![Effect::reply(from, Message::error(NOT_YOUR_TURN))];
        }

        if !self.game.place(usize::from(pos), active) {
            info!("Move rejected");
            return vec![Effect::reply(from, Message::MoveResult(MoveStatus::Rejected))];
        }

        let mut effects = vec![
            Effect::reply(from, Message::MoveResult(MoveStatus::Accepted)),
            Effect::send(Recipient::Both, Message::BoardUpdate(self.game.board().clone())),
        ];

        if self.game.check_win(active) {
            self.finish(Outcome::Win(active));
            effects.push(Effect::send(Recipient::Both, Message::Win(active)));
            effects.push(Effect::Close(Recipient::Both));
        } else if self.game.is_draw() {
            self.finish(Outcome::Draw);
            effects.push(Effect::send(Recipient::Both, Message::Draw));
            effects.push(Effect::Close(Recipient::Both));
        } else {
            self.game.switch_player();
            let next = self.game.active_player();
            self.state = TurnState::AwaitingMove(next);
            debug!(%next, "Turn passed");
            effects.push(Effect::send(Recipient::Both, Message::Turn(next)));
        }

        effects
    }

    /// Reacts to `player`'s session ending.
    ///
    /// Mid-game, the opponent is told and the game is abandoned. Outside of
    /// play nothing changes.
    #[instrument(skip(self), fields(state = ?self.state))]
    pub fn player_left(&mut self, player: Player) -> Vec<Effect> {
        match self.state {
            TurnState::AwaitingMove(_) => {
                self.finish(Outcome::Abandoned);
                let opponent = player.opponent();
                vec![
                    Effect::reply(opponent, Message::error(OPPONENT_DISCONNECTED)),
                    Effect::Close(Recipient::Only(opponent)),
                ]
            }
            TurnState::AwaitingPlayers | TurnState::GameOver(_) => Vec::new(),
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        info!(%outcome, "Game over");
        self.state = TurnState::GameOver(outcome);
    }
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new()
    }
}
