//! Win detection logic for tic-tac-toe.

use crate::{Board, Position, Square, Symbol};
use tracing::instrument;

/// The 8 three-in-a-row lines, as board indices.
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

/// Checks if there is a winner on the board.
///
/// Returns `Some(symbol)` if a symbol fills one of the [`LINES`],
/// `None` otherwise.
#[instrument(level = "trace")]
pub fn check_winner(board: &Board) -> Option<Symbol> {
    let squares = board.squares();
    for [a, b, c] in LINES {
        if let Square::Occupied(symbol) = squares[a]
            && squares[b] == squares[a]
            && squares[c] == squares[a]
        {
            return Some(symbol);
        }
    }
    None
}

/// Returns the line indices currently held by `symbol`.
pub fn winning_lines(board: &Board, symbol: Symbol) -> Vec<[Position; 3]> {
    LINES
        .iter()
        .filter(|line| {
            line.iter()
                .all(|&i| board.squares()[i] == Square::Occupied(symbol))
        })
        .map(|&[a, b, c]| [Position::ALL[a], Position::ALL[b], Position::ALL[c]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(cells: &[(usize, Symbol)]) -> Board {
        let mut board = Board::new();
        for &(index, symbol) in cells {
            board.place(Position::ALL[index], symbol).unwrap();
        }
        board
    }

    #[test]
    fn test_no_winner_empty_board() {
        assert_eq!(check_winner(&Board::new()), None);
    }

    #[test]
    fn test_every_line_wins() {
        for symbol in [Symbol::X, Symbol::O] {
            for line in LINES {
                let cells: Vec<_> = line.iter().map(|&i| (i, symbol)).collect();
                assert_eq!(check_winner(&board_with(&cells)), Some(symbol), "line {line:?}");
            }
        }
    }

    #[test]
    fn test_mixed_line_is_not_a_win() {
        let board = board_with(&[(0, Symbol::X), (1, Symbol::O), (2, Symbol::X)]);
        assert_eq!(check_winner(&board), None);
    }

    #[test]
    fn test_no_winner_incomplete() {
        let board = board_with(&[(0, Symbol::X), (1, Symbol::X)]);
        assert_eq!(check_winner(&board), None);
    }

    #[test]
    fn test_winner_iff_some_line_uniform() {
        // Walk every 3^9 board and compare against a direct line scan.
        for code in 0..3usize.pow(9) {
            let mut squares = [Square::Empty; 9];
            let mut rest = code;
            for square in squares.iter_mut() {
                *square = match rest % 3 {
                    0 => Square::Empty,
                    1 => Square::Occupied(Symbol::X),
                    _ => Square::Occupied(Symbol::O),
                };
                rest /= 3;
            }
            let board = Board::from(squares);
            let uniform = LINES.iter().any(|&[a, b, c]| {
                squares[a] != Square::Empty && squares[a] == squares[b] && squares[b] == squares[c]
            });
            assert_eq!(check_winner(&board).is_some(), uniform, "board {squares:?}");
        }
    }

    #[test]
    fn test_winning_lines_reports_double_line() {
        let board = board_with(&[
            (0, Symbol::X),
            (1, Symbol::X),
            (2, Symbol::X),
            (4, Symbol::X),
            (8, Symbol::X),
        ]);
        assert_eq!(winning_lines(&board, Symbol::X).len(), 2);
        assert!(winning_lines(&board, Symbol::O).is_empty());
    }
}
