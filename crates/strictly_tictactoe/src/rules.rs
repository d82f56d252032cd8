//! Game logic and rules for tic-tac-toe.

mod draw;
mod win;

pub use draw::{is_draw, is_full};
pub use win::{LINES, has_line};

use crate::{Board, Player, Square};
use tracing::{debug, instrument};

/// Tic-tac-toe game: the board plus whose turn it is.
///
/// Turn advance is explicit. [`Game::place`] marks a square and leaves the
/// active player alone; the caller decides when to [`Game::switch_player`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    board: Board,
    active: Player,
}

impl Game {
    /// Creates a new game with an empty board and X to move.
    #[instrument]
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            active: Player::X,
        }
    }

    /// Clears the board and hands the move back to X.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        self.board.clear();
        self.active = Player::X;
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the player whose move is expected.
    pub fn active_player(&self) -> Player {
        self.active
    }

    /// Toggles the active player.
    #[instrument(skip(self), fields(from = %self.active))]
    pub fn switch_player(&mut self) {
        self.active = self.active.opponent();
    }

    /// True iff `pos` is on the board and empty.
    pub fn is_valid_move(&self, pos: usize) -> bool {
        pos < Board::SIZE && self.board.is_empty(pos)
    }

    /// Marks `pos` for `player`.
    ///
    /// Returns false and leaves the board untouched when the move is not
    /// valid.
    #[instrument(skip(self))]
    pub fn place(&mut self, pos: usize, player: Player) -> bool {
        if !self.is_valid_move(pos) {
            debug!("Rejected placement");
            return false;
        }
        self.board.set(pos, Square::Occupied(player)).is_ok()
    }

    /// True iff `player` holds a full line.
    pub fn check_win(&self, player: Player) -> bool {
        has_line(&self.board, player)
    }

    /// True iff the board is full and nobody won.
    pub fn is_draw(&self) -> bool {
        is_draw(&self.board)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_game_x_to_move() {
        let game = Game::new();
        assert_eq!(game.active_player(), Player::X);
        assert_eq!(game.board(), &Board::new());
    }

    #[test]
    fn test_valid_move_iff_empty() {
        let mut game = Game::new();
        assert!(game.place(3, Player::X));
        for pos in 0..Board::SIZE {
            assert_eq!(game.is_valid_move(pos), pos != 3);
        }
        assert!(!game.is_valid_move(9));
        assert!(!game.is_valid_move(usize::MAX));
    }

    #[test]
    fn test_invalid_place_never_mutates() {
        let mut game = Game::new();
        assert!(game.place(0, Player::X));
        let before = game.clone();

        assert!(!game.place(0, Player::O));
        assert!(!game.place(9, Player::O));
        assert_eq!(game, before);
    }

    #[test]
    fn test_place_does_not_advance_turn() {
        let mut game = Game::new();
        assert!(game.place(4, Player::X));
        assert_eq!(game.active_player(), Player::X);
        game.switch_player();
        assert_eq!(game.active_player(), Player::O);
        game.switch_player();
        assert_eq!(game.active_player(), Player::X);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut game = Game::new();
        game.place(0, Player::X);
        game.switch_player();
        game.reset();
        assert_eq!(game, Game::new());
        game.reset();
        assert_eq!(game, Game::new());
    }

    #[test]
    fn test_win_and_draw_through_game() {
        let mut game = Game::new();
        for (pos, player) in [(0, Player::X), (3, Player::O), (1, Player::X), (4, Player::O)] {
            assert!(game.place(pos, player));
        }
        assert!(!game.check_win(Player::X));
        assert!(game.place(2, Player::X));
        assert!(game.check_win(Player::X));
        assert!(!game.check_win(Player::O));
        assert!(!game.is_draw());
    }
}
