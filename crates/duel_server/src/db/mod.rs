//! Database persistence layer for accounts and game sessions.

mod error;
mod models;
mod repository;
mod schema;

pub use error::DbError;
pub use models::{
    CompletedRound, GameOutcome, MoveRecord, NewSession, NewUser, PublicProfile, RoundMove,
    RoundRecord, RoundSnapshot, RoundWinner, Seat, SessionCounters, SessionFilter, SessionRecord,
    SessionSnapshot, SessionType, User, UserChanges,
};
pub use repository::GameRepository;
