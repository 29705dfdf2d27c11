//! Game rules for tic-tac-toe.
//!
//! Pure functions over a [`Board`](crate::Board). Draw detection is kept
//! separate from win detection so callers can compose them.

pub mod draw;
pub mod win;

pub use draw::{is_draw, is_full};
pub use win::check_winner;
