//! Core domain types for tic-tac-toe.

use crate::position::{Position, PositionError};
use crate::rules;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// The mark a player places.
///
/// Serialized and parsed as `"X"` / `"O"`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Symbol {
    /// Moves first in every round.
    X,
    /// Moves second.
    O,
}

impl Symbol {
    /// Returns the other symbol.
    pub fn opponent(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

/// A square on the board.
///
/// On the wire a square is `null` when empty, otherwise the symbol string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<Symbol>", into = "Option<Symbol>")]
pub enum Square {
    /// No mark yet.
    #[default]
    Empty,
    /// Holds a player's mark.
    Occupied(Symbol),
}

impl Square {
    /// Returns the occupying symbol, if any.
    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Square::Empty => None,
            Square::Occupied(symbol) => Some(symbol),
        }
    }
}

impl From<Option<Symbol>> for Square {
    fn from(value: Option<Symbol>) -> Self {
        value.map_or(Square::Empty, Square::Occupied)
    }
}

impl From<Square> for Option<Symbol> {
    fn from(square: Square) -> Self {
        square.symbol()
    }
}

/// 3x3 board in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    squares: [Square; 9],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the square at `pos`.
    pub fn get(&self, pos: Position) -> Square {
        self.squares[pos.index()]
    }

    /// Checks if the square at `pos` is empty.
    pub fn is_empty(&self, pos: Position) -> bool {
        self.get(pos) == Square::Empty
    }

    /// Places `symbol` at `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError::Occupied`] if the square already holds a mark.
    #[instrument(skip(self))]
    pub fn place(&mut self, pos: Position, symbol: Symbol) -> Result<(), PositionError> {
        if !self.is_empty(pos) {
            return Err(PositionError::Occupied(pos));
        }
        self.squares[pos.index()] = Square::Occupied(symbol);
        Ok(())
    }

    /// Clears every square.
    pub fn reset(&mut self) {
        self.squares = [Square::Empty; 9];
    }

    /// Returns all squares.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Returns the symbol holding a complete line, if any.
    pub fn winner(&self) -> Option<Symbol> {
        rules::check_winner(self)
    }

    /// Checks if no empty square remains.
    pub fn is_full(&self) -> bool {
        rules::is_full(self)
    }

    /// Evaluates the board into a [`GameStatus`].
    pub fn status(&self) -> GameStatus {
        match self.winner() {
            Some(symbol) => GameStatus::Won(symbol),
            None if self.is_full() => GameStatus::Draw,
            None => GameStatus::InProgress,
        }
    }
}

impl From<[Square; 9]> for Board {
    fn from(squares: [Square; 9]) -> Self {
        Self { squares }
    }
}

/// Terminal evaluation of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    /// Moves remain and nobody has a line.
    InProgress,
    /// A symbol holds a complete line.
    Won(Symbol),
    /// Board is full with no line.
    Draw,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(index: usize) -> Position {
        Position::new(index).unwrap()
    }

    #[test]
    fn test_place_rejects_occupied_square() {
        let mut board = Board::new();
        board.place(pos(4), Symbol::X).unwrap();
        assert_eq!(board.place(pos(4), Symbol::O), Err(PositionError::Occupied(pos(4))));
        assert_eq!(board.get(pos(4)), Square::Occupied(Symbol::X));
    }

    #[test]
    fn test_serializes_as_nullable_symbols() {
        let mut board = Board::new();
        board.place(pos(0), Symbol::X).unwrap();
        board.place(pos(8), Symbol::O).unwrap();
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, r#"["X",null,null,null,null,null,null,null,"O"]"#);
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_symbol_parses_from_str() {
        assert_eq!("X".parse::<Symbol>().unwrap(), Symbol::X);
        assert_eq!("O".parse::<Symbol>().unwrap(), Symbol::O);
        assert!("Z".parse::<Symbol>().is_err());
    }

    #[test]
    fn test_status_draw() {
        let mut board = Board::new();
        let moves = [0, 1, 2, 4, 3, 5, 7, 6, 8];
        let mut symbol = Symbol::X;
        for index in moves {
            board.place(pos(index), symbol).unwrap();
            symbol = symbol.opponent();
        }
        assert_eq!(board.status(), GameStatus::Draw);
    }
}
