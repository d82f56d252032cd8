//! Draw detection logic for tic-tac-toe.

use super::win::has_line;
use crate::{Board, Player, Square};
use tracing::instrument;

/// Checks if the board is full (all squares occupied).
#[instrument(skip(board))]
pub fn is_full(board: &Board) -> bool {
    board.squares().iter().all(|s| *s != Square::Empty)
}

/// A full board on which neither player holds a line.
#[instrument(skip(board))]
pub fn is_draw(board: &Board) -> bool {
    !has_line(board, Player::X) && !has_line(board, Player::O) && is_full(board)
}
