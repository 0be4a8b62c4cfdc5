//! Game implementations hosted by the arena.

pub mod tictactoe;
