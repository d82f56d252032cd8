//! Core domain types for tic-tac-toe.

/// Player in the game.
///
/// Identities are assigned in connection order: the first player is `X`
/// (wire id 1) and moves first, the second is `O` (wire id 2).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    strum::EnumIter,
)]
pub enum Player {
    /// Player X (goes first).
    #[display("X")]
    X,
    /// Player O (goes second).
    #[display("O")]
    O,
}

impl Player {
    /// Returns the opponent player.
    pub fn opponent(self) -> Self {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    /// Wire identity of this player (1 or 2).
    pub fn id(self) -> u8 {
        match self {
            Player::X => 1,
            Player::O => 2,
        }
    }

    /// Parses a wire identity.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Player::X),
            2 => Some(Player::O),
            _ => None,
        }
    }

    /// Slot index in a two-entry table (0 or 1).
    pub fn slot(self) -> usize {
        usize::from(self.id() - 1)
    }

    /// Player owning the given slot index.
    pub fn from_slot(slot: usize) -> Option<Self> {
        match slot {
            0 => Some(Player::X),
            1 => Some(Player::O),
            _ => None,
        }
    }
}

/// A square on the tic-tac-toe board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Square {
    /// Empty square.
    #[default]
    Empty,
    /// Square occupied by a player.
    Occupied(Player),
}

impl Square {
    /// Wire value: 0 = empty, otherwise the occupying player's id.
    pub fn to_byte(self) -> u8 {
        match self {
            Square::Empty => 0,
            Square::Occupied(player) => player.id(),
        }
    }

    /// Parses a wire value.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Square::Empty),
            id => Player::from_id(id).map(Square::Occupied),
        }
    }
}

/// 3x3 tic-tac-toe board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Squares in row-major order (0-8).
    squares: [Square; 9],
}

impl Board {
    /// Number of squares on the board.
    pub const SIZE: usize = 9;

    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; Self::SIZE],
        }
    }

    /// Builds a board from a row-major square array.
    pub fn from_squares(squares: [Square; 9]) -> Self {
        Self { squares }
    }

    /// Gets the square at the given position (0-8).
    pub fn get(&self, pos: usize) -> Option<Square> {
        self.squares.get(pos).copied()
    }

    /// Sets the square at the given position.
    pub fn set(&mut self, pos: usize, square: Square) -> Result<(), &'static str> {
        let slot = self.squares.get_mut(pos).ok_or("Position out of bounds")?;
        *slot = square;
        Ok(())
    }

    /// Checks if a square is empty.
    pub fn is_empty(&self, pos: usize) -> bool {
        matches!(self.get(pos), Some(Square::Empty))
    }

    /// Returns all squares as a slice.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Clears every square.
    pub fn clear(&mut self) {
        self.squares = [Square::Empty; Self::SIZE];
    }

    /// Number of squares marked by `player`.
    pub fn count(&self, player: Player) -> usize {
        self.squares
            .iter()
            .filter(|s| **s == Square::Occupied(player))
            .count()
    }

    /// Formats the board as a human-readable grid.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            result.push(' ');
            for col in 0..3 {
                let symbol = match self.squares[row * 3 + col] {
                    Square::Empty => '.',
                    Square::Occupied(Player::X) => 'X',
                    Square::Occupied(Player::O) => 'O',
                };
                result.push(symbol);
                if col < 2 {
                    result.push_str(" | ");
                }
            }
            result.push('\n');
            if row < 2 {
                result.push_str("---+---+---\n");
            }
        }
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
