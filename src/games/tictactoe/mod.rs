//! Tic-tac-toe board, positions and outcome rules.

mod position;
pub mod rules;
mod types;

pub use position::{Position, PositionOutOfRange};
pub use rules::{Outcome, check_winner, evaluate, is_full};
pub use types::{Board, Mark, Square};
