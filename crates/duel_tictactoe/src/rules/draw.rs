//! Draw detection logic for tic-tac-toe.

use super::win::check_winner;
use crate::{Board, Square};
use tracing::instrument;

/// Checks if the board is full (all squares occupied).
#[instrument(level = "trace")]
pub fn is_full(board: &Board) -> bool {
    board.squares().iter().all(|s| *s != Square::Empty)
}

/// A draw is a full board with no winner.
#[instrument(level = "trace")]
pub fn is_draw(board: &Board) -> bool {
    is_full(board) && check_winner(board).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, Symbol};

    fn play(moves: &[usize]) -> Board {
        let mut board = Board::new();
        let mut symbol = Symbol::X;
        for &index in moves {
            board.place(Position::ALL[index], symbol).unwrap();
            symbol = symbol.opponent();
        }
        board
    }

    #[test]
    fn test_empty_board_not_full() {
        assert!(!is_full(&Board::new()));
        assert!(!is_draw(&Board::new()));
    }

    #[test]
    fn test_partial_board_not_full() {
        assert!(!is_full(&play(&[4, 0])));
    }

    #[test]
    fn test_draw_detection() {
        // X O X / X O O / O X X
        let board = play(&[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert!(is_full(&board));
        assert!(is_draw(&board));
    }

    #[test]
    fn test_not_draw_if_winner_on_last_move() {
        // X completes the 0-4-8 diagonal with the ninth mark.
        let board = play(&[0, 1, 2, 3, 4, 5, 7, 6, 8]);
        assert!(is_full(&board));
        assert!(!is_draw(&board));
    }
}
