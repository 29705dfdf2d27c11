//! Pure tic-tac-toe board logic.
//!
//! This crate has no I/O and no runtime state. It provides the board
//! representation shared by the live-room coordinator and the persistence
//! layer, plus the evaluator that decides whether a board is terminal.
//!
//! # Example
//!
//! ```
//! use duel_tictactoe::{Board, GameStatus, Position, Symbol};
//!
//! let mut board = Board::new();
//! let moves = [(0, Symbol::X), (3, Symbol::O), (1, Symbol::X), (4, Symbol::O), (2, Symbol::X)];
//! for (index, symbol) in moves {
//!     board.place(Position::new(index).unwrap(), symbol).unwrap();
//! }
//! assert_eq!(board.status(), GameStatus::Won(Symbol::X));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod position;
pub mod rules;
mod types;

pub use position::{Position, PositionError};
pub use rules::{check_winner, is_draw, is_full};
pub use types::{Board, GameStatus, Square, Symbol};
