//! Combined outcome evaluation consulted after every accepted move.

use super::super::{Board, Mark};
use super::{check_winner, is_full};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Result of evaluating a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// No line complete and at least one empty square.
    None,
    /// A line of three equal marks exists.
    Win(Mark),
    /// Every square is filled and no line is complete.
    Draw,
}

/// Evaluates the board: a win takes precedence over a full board.
#[instrument(skip(board))]
pub fn evaluate(board: &Board) -> Outcome {
    if let Some(mark) = check_winner(board) {
        Outcome::Win(mark)
    } else if is_full(board) {
        Outcome::Draw
    } else {
        Outcome::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::rules::win::LINES;
    use crate::games::tictactoe::{Position, Square};

    /// Decodes `code` as nine base-3 digits (0 empty, 1 X, 2 O).
    fn board_from_code(mut code: u32) -> Board {
        let mut board = Board::new();
        for pos in Position::ALL {
            let square = match code % 3 {
                0 => Square::Empty,
                1 => Square::Occupied(Mark::X),
                _ => Square::Occupied(Mark::O),
            };
            board.set(pos, square);
            code /= 3;
        }
        board
    }

    fn has_complete_line(board: &Board) -> bool {
        LINES.iter().any(|&[a, b, c]| {
            board.get(a) != Square::Empty && board.get(a) == board.get(b) && board.get(a) == board.get(c)
        })
    }

    #[test]
    fn test_draw_iff_full_without_line_on_every_board() {
        for code in 0..3u32.pow(9) {
            let board = board_from_code(code);
            let full = board.squares().iter().all(|s| *s != Square::Empty);
            let expect_draw = full && !has_complete_line(&board);
            assert_eq!(
                evaluate(&board) == Outcome::Draw,
                expect_draw,
                "board code {code}:\n{}",
                board.display()
            );
        }
    }

    #[test]
    fn test_win_reported_iff_line_exists() {
        for code in 0..3u32.pow(9) {
            let board = board_from_code(code);
            let is_win = matches!(evaluate(&board), Outcome::Win(_));
            assert_eq!(is_win, has_complete_line(&board), "board code {code}");
        }
    }

    #[test]
    fn test_empty_board_is_open() {
        assert_eq!(evaluate(&Board::new()), Outcome::None);
    }

    #[test]
    fn test_full_board_with_line_is_win() {
        // X X X / O O X / X O O
        let board = board_from_code(
            [1, 1, 1, 2, 2, 1, 1, 2, 2]
                .iter()
                .rev()
                .fold(0, |acc, d| acc * 3 + d),
        );
        assert_eq!(evaluate(&board), Outcome::Win(Mark::X));
    }
}
