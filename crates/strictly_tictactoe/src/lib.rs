//! Pure tic-tac-toe board model.
//!
//! No I/O and no locking: callers serialize access to a [`Game`]
//! themselves.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod rules;
mod types;

pub use rules::{Game, LINES, has_line, is_draw, is_full};
pub use types::{Board, Player, Square};
