//! Board positions (0-8, row-major).

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A validated index into the 3x3 board.
///
/// Positions are numbered left-to-right, top-to-bottom:
///
/// ```text
/// 0|1|2
/// -+-+-
/// 3|4|5
/// -+-+-
/// 6|7|8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Position(u8);

impl Position {
    /// All 9 positions in index order.
    pub const ALL: [Position; 9] = [
        Position(0),
        Position(1),
        Position(2),
        Position(3),
        Position(4),
        Position(5),
        Position(6),
        Position(7),
        Position(8),
    ];

    /// Creates a position from a board index.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError::OutOfRange`] if `index >= 9`.
    #[instrument]
    pub fn new(index: usize) -> Result<Self, PositionError> {
        if index < 9 {
            Ok(Self(index as u8))
        } else {
            Err(PositionError::OutOfRange(index))
        }
    }

    /// Returns the board index (0-8).
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<usize> for Position {
    type Error = PositionError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<Position> for usize {
    fn from(pos: Position) -> Self {
        pos.index()
    }
}

/// Reasons a position cannot receive a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PositionError {
    /// Index outside 0-8.
    #[display("Position {} is out of range (must be 0-8)", _0)]
    OutOfRange(usize),

    /// The square already holds a mark.
    #[display("Position {} is already occupied", _0)]
    Occupied(Position),
}

impl std::error::Error for PositionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_board_indices() {
        for index in 0..9 {
            assert_eq!(Position::new(index).unwrap().index(), index);
        }
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert_eq!(Position::new(9), Err(PositionError::OutOfRange(9)));
        assert_eq!(Position::new(usize::MAX), Err(PositionError::OutOfRange(usize::MAX)));
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Position>("4").is_ok());
        assert!(serde_json::from_str::<Position>("12").is_err());
    }
}
