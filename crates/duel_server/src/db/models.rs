//! Database models and domain types.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use duel_tictactoe::{Board, Position, Symbol};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::{DbError, schema};

/// Account database model.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::users)]
pub struct User {
    id: i32,
    username: String,
    email: String,
    password_hash: String,
    wins: i32,
    losses: i32,
    draws: i32,
    total_games: i32,
    bio: String,
    avatar: Option<String>,
    is_active: bool,
    last_login: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl User {
    /// Win rate as a percentage (0.0–100.0).
    pub fn win_rate(&self) -> f64 {
        if self.total_games == 0 {
            0.0
        } else {
            (self.wins as f64 / self.total_games as f64) * 100.0
        }
    }

    /// Profile view safe to send to clients (no password hash).
    pub fn to_public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            wins: self.wins,
            losses: self.losses,
            draws: self.draws,
            total_games: self.total_games,
            win_rate: self.win_rate().round() as i32,
            avatar: self.avatar.clone(),
            bio: self.bio.clone(),
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

/// Client-facing account profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// Account id.
    pub id: i32,
    /// Unique username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Rounds won.
    pub wins: i32,
    /// Rounds lost.
    pub losses: i32,
    /// Rounds drawn.
    pub draws: i32,
    /// Rounds played.
    pub total_games: i32,
    /// Rounded win percentage.
    pub win_rate: i32,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Free-form bio.
    pub bio: String,
    /// Registration time.
    pub created_at: NaiveDateTime,
    /// Last successful login.
    pub last_login: Option<NaiveDateTime>,
}

/// Insertable account.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    username: String,
    email: String,
    password_hash: String,
}

/// Partial profile update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::users)]
pub struct UserChanges {
    /// New username.
    pub username: Option<String>,
    /// New email.
    pub email: Option<String>,
    /// New bio.
    pub bio: Option<String>,
    /// `Some(None)` clears the avatar.
    pub avatar: Option<Option<String>>,
}

/// Persisted game session: the aggregate of every round two named players
/// completed in one room.
#[derive(
    Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Getters, Serialize, Deserialize,
)]
#[diesel(table_name = schema::game_sessions)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    id: i32,
    player1_name: String,
    player2_name: String,
    player1_id: Option<i32>,
    player2_id: Option<i32>,
    player1_wins: i32,
    player2_wins: i32,
    draws: i32,
    total_rounds: i32,
    is_active: bool,
    session_type: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl SessionRecord {
    /// Resolves a player name to its seat. Seats are fixed by join order
    /// when the session is created.
    pub fn seat_of(&self, name: &str) -> Option<Seat> {
        if name == self.player1_name {
            Some(Seat::Player1)
        } else if name == self.player2_name {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    /// Whether the session seats exactly these two names, in either order.
    pub fn is_between(&self, first: &str, second: &str) -> bool {
        (first == self.player1_name && second == self.player2_name)
            || (first == self.player2_name && second == self.player1_name)
    }

    /// Account linked to `seat`, if any.
    pub fn account_for(&self, seat: Seat) -> Option<i32> {
        match seat {
            Seat::Player1 => self.player1_id,
            Seat::Player2 => self.player2_id,
        }
    }
}

/// Insertable game session.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::game_sessions)]
pub struct NewSession {
    player1_name: String,
    player2_name: String,
    player1_id: Option<i32>,
    player2_id: Option<i32>,
    player1_wins: i32,
    player2_wins: i32,
    draws: i32,
    total_rounds: i32,
    session_type: String,
}

impl NewSession {
    /// A fresh session with zeroed counters.
    #[instrument]
    pub fn for_players(
        player1_name: String,
        player2_name: String,
        player1_id: Option<i32>,
        player2_id: Option<i32>,
    ) -> Self {
        let session_type = SessionType::for_accounts(player1_id, player2_id);
        Self {
            player1_name,
            player2_name,
            player1_id,
            player2_id,
            player1_wins: 0,
            player2_wins: 0,
            draws: 0,
            total_rounds: 0,
            session_type: session_type.to_string(),
        }
    }

    /// Seeds the counters (used by the REST create endpoint).
    pub fn with_counters(
        mut self,
        player1_wins: i32,
        player2_wins: i32,
        draws: i32,
        total_rounds: i32,
    ) -> Self {
        self.player1_wins = player1_wins;
        self.player2_wins = player2_wins;
        self.draws = draws;
        self.total_rounds = total_rounds;
        self
    }
}

/// Counter overrides for a session. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = schema::game_sessions)]
pub struct SessionCounters {
    /// Wins for the first seat.
    pub player1_wins: Option<i32>,
    /// Wins for the second seat.
    pub player2_wins: Option<i32>,
    /// Drawn rounds.
    pub draws: Option<i32>,
    /// Completed rounds.
    pub total_rounds: Option<i32>,
}

impl SessionCounters {
    /// Checks if no counter is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Filter for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Restrict to one session type.
    pub session_type: Option<SessionType>,
    /// Restrict by the active flag.
    pub is_active: Option<bool>,
}

/// Whether session players are accounts or guests.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionType {
    /// Neither player is an account.
    Guest,
    /// Both players are accounts.
    Authenticated,
    /// Exactly one player is an account.
    Mixed,
}

impl SessionType {
    /// Classifies a pair of optional account ids.
    pub fn for_accounts(player1_id: Option<i32>, player2_id: Option<i32>) -> Self {
        match (player1_id, player2_id) {
            (Some(_), Some(_)) => Self::Authenticated,
            (None, None) => Self::Guest,
            _ => Self::Mixed,
        }
    }
}

/// One of the two fixed session seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    /// The room creator.
    Player1,
    /// The player who filled the room.
    Player2,
}

/// Winner of a completed round, by seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundWinner {
    /// First seat won.
    Player1,
    /// Second seat won.
    Player2,
    /// Full board, no line.
    Draw,
}

impl RoundWinner {
    /// Winner for `seat`.
    pub fn seat(seat: Seat) -> Self {
        match seat {
            Seat::Player1 => Self::Player1,
            Seat::Player2 => Self::Player2,
        }
    }

    /// Result of this round from `seat`'s perspective.
    pub fn outcome_for(self, seat: Seat) -> GameOutcome {
        match (self, seat) {
            (Self::Draw, _) => GameOutcome::Draw,
            (Self::Player1, Seat::Player1) | (Self::Player2, Seat::Player2) => GameOutcome::Win,
            _ => GameOutcome::Loss,
        }
    }

    /// Converts to the string stored in the database.
    pub fn to_db_string(self) -> &'static str {
        match self {
            Self::Player1 => "player1",
            Self::Player2 => "player2",
            Self::Draw => "draw",
        }
    }

    /// Parses the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid winner value.
    #[instrument(skip(s), fields(s = %s))]
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        match s {
            "player1" => Ok(Self::Player1),
            "player2" => Ok(Self::Player2),
            "draw" => Ok(Self::Draw),
            _ => Err(DbError::new(format!("Invalid round winner: '{}'", s))),
        }
    }
}

/// Round result from an account's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    /// Account won.
    Win,
    /// Account lost.
    Loss,
    /// Round drawn.
    Draw,
}

/// A move as recorded in a round's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct RoundMove {
    /// Symbol that moved.
    pub player: Symbol,
    /// Target square.
    pub position: Position,
    /// When the move was accepted.
    pub timestamp: NaiveDateTime,
}

/// A finished round, ready to append to a session.
#[derive(Debug, Clone, PartialEq, new)]
pub struct CompletedRound {
    /// Winning seat or draw.
    pub winner: RoundWinner,
    /// Final board.
    pub board: Board,
    /// Moves in play order.
    pub moves: Vec<RoundMove>,
}

/// Stored round row.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters)]
#[diesel(table_name = schema::game_rounds)]
#[diesel(belongs_to(SessionRecord, foreign_key = session_id))]
pub struct RoundRecord {
    id: i32,
    session_id: i32,
    winner: String,
    board: String,
    completed_at: NaiveDateTime,
}

/// Stored move row.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters)]
#[diesel(table_name = schema::round_moves)]
#[diesel(belongs_to(RoundRecord, foreign_key = round_id))]
pub struct MoveRecord {
    id: i32,
    round_id: i32,
    seq: i32,
    symbol: String,
    position: i32,
    played_at: NaiveDateTime,
}

impl MoveRecord {
    /// Decodes the row into a [`RoundMove`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the stored symbol or position is invalid.
    pub fn to_round_move(&self) -> Result<RoundMove, DbError> {
        let player = self
            .symbol
            .parse::<Symbol>()
            .map_err(|_| DbError::new(format!("Invalid symbol: '{}'", self.symbol)))?;
        let position = usize::try_from(self.position)
            .ok()
            .and_then(|index| Position::new(index).ok())
            .ok_or_else(|| DbError::new(format!("Invalid position: {}", self.position)))?;
        Ok(RoundMove::new(player, position, self.played_at))
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::game_rounds)]
pub(crate) struct NewRound {
    pub(crate) session_id: i32,
    pub(crate) winner: String,
    pub(crate) board: String,
    pub(crate) completed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::round_moves)]
pub(crate) struct NewMove {
    pub(crate) round_id: i32,
    pub(crate) seq: i32,
    pub(crate) symbol: String,
    pub(crate) position: i32,
    pub(crate) played_at: NaiveDateTime,
}

/// A decoded round in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    /// Winning seat or draw.
    pub winner: RoundWinner,
    /// Final board.
    pub board: Board,
    /// Moves in play order.
    pub moves: Vec<RoundMove>,
    /// When the round finished.
    pub completed_at: NaiveDateTime,
}

/// A session together with its round history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session counters and players.
    #[serde(flatten)]
    pub session: SessionRecord,
    /// Completed rounds, oldest first.
    pub game_history: Vec<RoundSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_type_classification() {
        assert_eq!(SessionType::for_accounts(None, None), SessionType::Guest);
        assert_eq!(SessionType::for_accounts(Some(1), None), SessionType::Mixed);
        assert_eq!(SessionType::for_accounts(None, Some(2)), SessionType::Mixed);
        assert_eq!(SessionType::for_accounts(Some(1), Some(2)), SessionType::Authenticated);
        assert_eq!(SessionType::Mixed.to_string(), "mixed");
        assert_eq!("authenticated".parse::<SessionType>().unwrap(), SessionType::Authenticated);
    }

    #[test]
    fn test_round_winner_outcomes() {
        assert_eq!(RoundWinner::Player1.outcome_for(Seat::Player1), GameOutcome::Win);
        assert_eq!(RoundWinner::Player1.outcome_for(Seat::Player2), GameOutcome::Loss);
        assert_eq!(RoundWinner::Player2.outcome_for(Seat::Player2), GameOutcome::Win);
        assert_eq!(RoundWinner::Draw.outcome_for(Seat::Player1), GameOutcome::Draw);
    }

    #[test]
    fn test_round_winner_db_string_rejects_unknown() {
        assert_eq!(RoundWinner::from_db_string("draw").unwrap(), RoundWinner::Draw);
        assert!(RoundWinner::from_db_string("player3").is_err());
    }
}
