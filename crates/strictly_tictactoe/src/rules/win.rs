//! Win detection logic for tic-tac-toe.

use crate::{Board, Player, Square};
use tracing::instrument;

/// The eight winning lines: rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Returns true if `player` has marked every square of some line.
#[instrument(skip(board))]
pub fn has_line(board: &Board, player: Player) -> bool {
    let mark = Some(Square::Occupied(player));
    LINES
        .iter()
        .any(|line| line.iter().all(|&pos| board.get(pos) == mark))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(marks: &[(usize, Player)]) -> Board {
        let mut board = Board::new();
        for &(pos, player) in marks {
            board.set(pos, Square::Occupied(player)).unwrap();
        }
        board
    }

    #[test]
    fn test_no_winner_empty_board() {
        let board = Board::new();
        assert!(!has_line(&board, Player::X));
        assert!(!has_line(&board, Player::O));
    }

    #[test]
    fn test_every_line_wins() {
        for line in LINES {
            for player in [Player::X, Player::O] {
                let board = board_with(&line.map(|pos| (pos, player)));
                assert!(has_line(&board, player), "line {line:?} for {player}");
                assert!(!has_line(&board, player.opponent()));
            }
        }
    }

    #[test]
    fn test_three_marks_off_line_never_win() {
        // Every 3-subset of squares that is not a line must not win.
        for a in 0..9 {
            for b in (a + 1)..9 {
                for c in (b + 1)..9 {
                    let is_line = LINES.contains(&[a, b, c]);
                    let board = board_with(&[(a, Player::X), (b, Player::X), (c, Player::X)]);
                    assert_eq!(has_line(&board, Player::X), is_line, "{a},{b},{c}");
                }
            }
        }
    }

    #[test]
    fn test_mixed_line_does_not_win() {
        let board = board_with(&[(0, Player::X), (1, Player::O), (2, Player::X)]);
        assert!(!has_line(&board, Player::X));
        assert!(!has_line(&board, Player::O));
    }
}
