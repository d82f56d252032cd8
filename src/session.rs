//! Session coordination for the two player slots.
//!
//! The [`Coordinator`] owns the slot table and the [`TurnMachine`] behind a
//! single mutex. Every connection task holds a clone of the handle. The lock
//! is only taken for the read-modify-write of one event and is never held
//! across an `.await`: outgoing messages are pushed onto per-session
//! unbounded channels, which fixes delivery order without touching a socket.

use crate::protocol::{Frame, Message};
use crate::turn::{Effect, Recipient, TurnMachine, TurnState};
use derive_more::{Display, Error};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use strictly_tictactoe::{Board, Player};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

/// Sent to every connected player when the server stops.
pub const SHUTTING_DOWN: &str = "Server shutting down";

/// Unique identifier for one accepted connection.
pub type SessionId = u64;

/// Outgoing half of a session: messages queued here are written by that
/// connection's writer task. Dropping the handle ends the session.
#[derive(Debug)]
struct SessionHandle {
    id: SessionId,
    outbox: UnboundedSender<Message>,
}

/// Result of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Admission {
    /// Assigned identity.
    pub player: Player,
    /// Connection identity, used to ignore events from stale sessions.
    pub session: SessionId,
}

/// Why a connection was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum AdmissionError {
    /// Both slots are taken, or the server is shutting down.
    #[display("Server full")]
    ServerFull,
}

/// Fixed two-entry slot table, indexed by player.
#[derive(Debug, Default)]
struct SlotTable {
    slots: [Option<SessionHandle>; 2],
}

impl SlotTable {
    fn first_free(&self) -> Option<Player> {
        self.slots
            .iter()
            .position(Option::is_none)
            .and_then(Player::from_slot)
    }

    fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn get(&self, player: Player) -> Option<&SessionHandle> {
        self.slots[player.slot()].as_ref()
    }

    fn holds(&self, admission: &Admission) -> bool {
        self.get(admission.player)
            .is_some_and(|handle| handle.id == admission.session)
    }

    fn insert(&mut self, player: Player, handle: SessionHandle) {
        self.slots[player.slot()] = Some(handle);
    }

    fn take(&mut self, player: Player) -> Option<SessionHandle> {
        self.slots[player.slot()].take()
    }
}

#[derive(Debug)]
struct State {
    slots: SlotTable,
    machine: TurnMachine,
    next_session: SessionId,
    accepting: bool,
}

impl State {
    /// Applies effects in order. Closing a session may produce further
    /// effects (the opponent being told), which are appended to the queue.
    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Send { to, message } => {
                    for player in to.players() {
                        self.deliver(player, message.clone());
                    }
                }
                Effect::Close(to) => {
                    for player in to.players() {
                        if self.slots.take(player).is_some() {
                            info!(%player, "Session closed");
                            queue.extend(self.machine.player_left(player));
                        }
                    }
                }
            }
        }
    }

    fn deliver(&self, player: Player, message: Message) {
        match self.slots.get(player) {
            Some(handle) => {
                debug!(%player, kind = %message.kind(), "Queueing message");
                if handle.outbox.send(message).is_err() {
                    debug!(%player, "Writer already gone");
                }
            }
            None => debug!(%player, "No session to deliver to"),
        }
    }
}

/// Shared handle to the single game and its two player slots.
#[derive(Debug, Clone)]
pub struct Coordinator {
    state: Arc<Mutex<State>>,
}

impl Coordinator {
    /// Creates a coordinator with empty slots and a fresh game.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating session coordinator");
        Self {
            state: Arc::new(Mutex::new(State {
                slots: SlotTable::default(),
                machine: TurnMachine::new(),
                next_session: 1,
                accepting: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admits a new connection into the first free slot.
    ///
    /// Queues `Welcome` for the newcomer. If this fills the second slot,
    /// queues the game start for both players in the same critical section,
    /// so concurrent joins start the game exactly once.
    #[instrument(skip(self, outbox))]
    pub fn admit(&self, outbox: UnboundedSender<Message>) -> Result<Admission, AdmissionError> {
        let mut state = self.lock();

        if !state.accepting {
            warn!("Connection refused: shutting down");
            return Err(AdmissionError::ServerFull);
        }
        let Some(player) = state.slots.first_free() else {
            warn!("Connection refused: 2 players already connected");
            return Err(AdmissionError::ServerFull);
        };

        if matches!(state.machine.state(), TurnState::GameOver(_)) {
            state.machine.reset();
        }

        let session = state.next_session;
        state.next_session += 1;
        state.slots.insert(player, SessionHandle { id: session, outbox });
        info!(%player, session, "Player connected");

        state.deliver(player, Message::Welcome(player));
        if state.slots.is_full() {
            let effects = state.machine.start();
            state.apply(effects);
        }

        Ok(Admission { player, session })
    }

    /// Processes one frame received from an admitted session.
    ///
    /// Frames from a session that no longer owns its slot are dropped.
    #[instrument(skip(self, frame), fields(player = %admission.player, kind = frame.header.kind))]
    pub fn handle_frame(&self, admission: &Admission, frame: &Frame) {
        let mut state = self.lock();
        if !state.slots.holds(admission) {
            debug!("Frame from closed session ignored");
            return;
        }
        let effects = state.machine.handle(admission.player, frame.message());
        state.apply(effects);
    }

    /// Releases the slot of a session that ended on its own (EOF, I/O error).
    ///
    /// No-op when the slot was already released or now belongs to a newer
    /// connection.
    #[instrument(skip(self), fields(player = %admission.player))]
    pub fn disconnect(&self, admission: &Admission) {
        let mut state = self.lock();
        if !state.slots.holds(admission) {
            return;
        }
        info!("Player disconnected");
        state.apply(vec![Effect::Close(Recipient::Only(admission.player))]);
    }

    /// Stops admitting players, tells connected players, and ends their
    /// sessions.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.accepting = false;
        for player in [Player::X, Player::O] {
            state.deliver(player, Message::error(SHUTTING_DOWN));
            if state.slots.take(player).is_some() {
                info!(%player, "Session closed for shutdown");
            }
        }
    }

    /// Current protocol state.
    pub fn turn_state(&self) -> TurnState {
        self.lock().machine.state()
    }

    /// Snapshot of the board.
    pub fn board(&self) -> Board {
        self.lock().machine.game().board().clone()
    }

    /// Number of occupied slots.
    pub fn connected(&self) -> usize {
        self.lock().slots.occupied()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MoveStatus, decode};
    use crate::turn::{NOT_YOUR_TURN, OPPONENT_DISCONNECTED, Outcome};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn frame(message: Message) -> Frame {
        let bytes = message.to_bytes().unwrap();
        let (header, payload) = decode(&bytes).unwrap();
        Frame {
            header,
            payload: payload.to_vec(),
        }
    }

    fn join(coordinator: &Coordinator) -> (Admission, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (coordinator.admit(tx).unwrap(), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_admission_order_and_start() {
        let coordinator = Coordinator::new();
        let (a, mut rx_a) = join(&coordinator);
        assert_eq!(a.player, Player::X);
        assert_eq!(drain(&mut rx_a), vec![Message::Welcome(Player::X)]);
        assert_eq!(coordinator.turn_state(), TurnState::AwaitingPlayers);

        let (b, mut rx_b) = join(&coordinator);
        assert_eq!(b.player, Player::O);
        assert_ne!(a.session, b.session);

        let start = vec![Message::BoardUpdate(Board::new()), Message::Turn(Player::X)];
        assert_eq!(drain(&mut rx_a), start);
        let mut expected_b = vec![Message::Welcome(Player::O)];
        expected_b.extend(start);
        assert_eq!(drain(&mut rx_b), expected_b);
        assert_eq!(coordinator.turn_state(), TurnState::AwaitingMove(Player::X));
    }

    #[test]
    fn test_concurrent_joins_start_once() {
        for _ in 0..50 {
            let coordinator = Coordinator::new();
            let barrier = std::sync::Barrier::new(4);

            let joined: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        scope.spawn(|| {
                            let (tx, rx) = mpsc::unbounded_channel();
                            barrier.wait();
                            coordinator.admit(tx).ok().map(|admission| (admission, rx))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .filter_map(|handle| handle.join().unwrap())
                    .collect()
            });

            assert_eq!(joined.len(), 2);
            assert_ne!(joined[0].0.player, joined[1].0.player);
            for (_, mut rx) in joined {
                let turns = drain(&mut rx)
                    .into_iter()
                    .filter(|m| matches!(m, Message::Turn(_)))
                    .count();
                assert_eq!(turns, 1);
            }
            assert_eq!(coordinator.turn_state(), TurnState::AwaitingMove(Player::X));
        }
    }

    #[test]
    fn test_third_connection_refused() {
        let coordinator = Coordinator::new();
        let _a = join(&coordinator);
        let _b = join(&coordinator);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(coordinator.admit(tx), Err(AdmissionError::ServerFull));
        assert_eq!(coordinator.connected(), 2);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let coordinator = Coordinator::new();
        let (a, _rx_a) = join(&coordinator);
        coordinator.disconnect(&a);
        assert_eq!(coordinator.connected(), 0);

        let (again, mut rx) = join(&coordinator);
        assert_eq!(again.player, Player::X);
        assert_eq!(drain(&mut rx), vec![Message::Welcome(Player::X)]);
    }

    #[test]
    fn test_out_of_turn_goes_to_sender_only() {
        let coordinator = Coordinator::new();
        let (_a, mut rx_a) = join(&coordinator);
        let (b, mut rx_b) = join(&coordinator);
        drain(&mut rx_a);
        drain(&mut rx_b);

        coordinator.handle_frame(&b, &frame(Message::MoveRequest(4)));
        assert_eq!(drain(&mut rx_b), vec![Message::error(NOT_YOUR_TURN)]);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(coordinator.board(), Board::new());
    }

    #[test]
    fn test_win_closes_both_sessions() {
        let coordinator = Coordinator::new();
        let (a, mut rx_a) = join(&coordinator);
        let (b, mut rx_b) = join(&coordinator);

        for (who, pos) in [(&a, 0), (&b, 3), (&a, 1), (&b, 4), (&a, 2)] {
            coordinator.handle_frame(who, &frame(Message::MoveRequest(pos)));
        }

        let last = drain(&mut rx_a);
        assert_eq!(last[last.len() - 1], Message::Win(Player::X));
        assert!(last.contains(&Message::MoveResult(MoveStatus::Accepted)));
        assert_eq!(drain(&mut rx_b).last(), Some(&Message::Win(Player::X)));

        // Senders dropped: both writers see the end of their queue.
        assert!(rx_a.try_recv().is_err() && rx_a.is_closed());
        assert!(rx_b.is_closed());
        assert_eq!(coordinator.connected(), 0);
        assert_eq!(
            coordinator.turn_state(),
            TurnState::GameOver(Outcome::Win(Player::X))
        );
    }

    #[test]
    fn test_quit_mid_game_notifies_opponent() {
        let coordinator = Coordinator::new();
        let (a, mut rx_a) = join(&coordinator);
        let (_b, mut rx_b) = join(&coordinator);
        drain(&mut rx_b);

        coordinator.handle_frame(&a, &frame(Message::QuitRequest));
        assert!(rx_a.is_closed());
        assert_eq!(drain(&mut rx_b), vec![Message::error(OPPONENT_DISCONNECTED)]);
        assert!(rx_b.is_closed());
        assert_eq!(coordinator.turn_state(), TurnState::GameOver(Outcome::Abandoned));
    }

    #[test]
    fn test_new_pair_after_game_over_gets_fresh_game() {
        let coordinator = Coordinator::new();
        let (a, _rx_a) = join(&coordinator);
        let (_b, _rx_b) = join(&coordinator);
        coordinator.handle_frame(&a, &frame(Message::MoveRequest(0)));
        coordinator.disconnect(&a);
        assert_eq!(coordinator.connected(), 0);

        let (_c, mut rx_c) = join(&coordinator);
        assert_eq!(coordinator.turn_state(), TurnState::AwaitingPlayers);
        let (_d, _rx_d) = join(&coordinator);
        assert_eq!(
            drain(&mut rx_c),
            vec![
                Message::Welcome(Player::X),
                Message::BoardUpdate(Board::new()),
                Message::Turn(Player::X),
            ]
        );
    }

    #[test]
    fn test_stale_session_cannot_touch_new_slot() {
        let coordinator = Coordinator::new();
        let (a, _rx_a) = join(&coordinator);
        coordinator.disconnect(&a);
        let (_fresh, _rx) = join(&coordinator);

        coordinator.disconnect(&a);
        coordinator.handle_frame(&a, &frame(Message::QuitRequest));
        assert_eq!(coordinator.connected(), 1);
    }

    #[test]
    fn test_shutdown_notifies_and_refuses() {
        let coordinator = Coordinator::new();
        let (_a, mut rx_a) = join(&coordinator);
        drain(&mut rx_a);

        coordinator.shutdown();
        assert_eq!(drain(&mut rx_a), vec![Message::error(SHUTTING_DOWN)]);
        assert!(rx_a.is_closed());

        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(coordinator.admit(tx), Err(AdmissionError::ServerFull));
    }
}
