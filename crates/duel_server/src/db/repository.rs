//! Database repository for accounts and game sessions.

use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use duel_tictactoe::Board;
use tracing::{debug, info, instrument, warn};

use crate::db::models::{NewMove, NewRound};
use crate::db::{
    CompletedRound, DbError, GameOutcome, MoveRecord, NewSession, NewUser, RoundRecord,
    RoundSnapshot, RoundWinner, SessionCounters, SessionFilter, SessionRecord, SessionSnapshot,
    User, UserChanges, schema,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database repository for account and session operations.
///
/// Every method opens its own connection, so the repository is cheap to
/// clone into blocking tasks.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a new repository for the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path must not be empty"));
        }
        info!(path = %db_path, "Creating GameRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Applies any pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(applied.len())
    }

    // ─────────────────────────────────────────────────────────────
    //  Accounts
    // ─────────────────────────────────────────────────────────────

    /// Creates a new account.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the username or email is taken or a database error occurs.
    #[instrument(skip(self, new_user))]
    pub fn create_user(&self, new_user: NewUser) -> Result<User, DbError> {
        let mut conn = self.connection()?;

        let user = diesel::insert_into(schema::users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut conn)?;

        info!(user_id = user.id(), username = %user.username(), "User created");
        Ok(user)
    }

    /// Gets an account by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user(&self, user_id: i32) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        let user = schema::users::table
            .find(user_id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        if user.is_none() {
            debug!(user_id, "User not found");
        }
        Ok(user)
    }

    /// Gets an account by username.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::users::table
            .filter(schema::users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    /// Gets an account by email (compared lower-cased).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::users::table
            .filter(schema::users::email.eq(email.to_lowercase()))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    /// Gets an account by username or email, for login.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::users::table
            .filter(
                schema::users::username
                    .eq(login)
                    .or(schema::users::email.eq(login.to_lowercase())),
            )
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    /// Applies a partial profile update. Returns `None` if the account is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, changes))]
    pub fn update_profile(
        &self,
        user_id: i32,
        changes: UserChanges,
    ) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        let now = Utc::now().naive_utc();
        let user = diesel::update(schema::users::table.find(user_id))
            .set((changes, schema::users::updated_at.eq(now)))
            .returning(User::as_returning())
            .get_result(&mut conn)
            .optional()?;
        if user.is_some() {
            info!(user_id, "Profile updated");
        }
        Ok(user)
    }

    /// Replaces an account's password hash.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, password_hash))]
    pub fn set_password_hash(&self, user_id: i32, password_hash: String) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let now = Utc::now().naive_utc();
        diesel::update(schema::users::table.find(user_id))
            .set((
                schema::users::password_hash.eq(password_hash),
                schema::users::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        info!(user_id, "Password changed");
        Ok(())
    }

    /// Records a successful login.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn touch_login(&self, user_id: i32) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let now = Utc::now().naive_utc();
        diesel::update(schema::users::table.find(user_id))
            .set(schema::users::last_login.eq(Some(now)))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Adds one round result to an account's aggregate counters.
    /// Returns `None` if the account is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn apply_account_result(
        &self,
        user_id: i32,
        outcome: GameOutcome,
    ) -> Result<Option<User>, DbError> {
        use schema::users::dsl;

        let mut conn = self.connection()?;
        let (win, loss, draw) = match outcome {
            GameOutcome::Win => (1, 0, 0),
            GameOutcome::Loss => (0, 1, 0),
            GameOutcome::Draw => (0, 0, 1),
        };
        let now = Utc::now().naive_utc();
        let user = diesel::update(dsl::users.find(user_id))
            .set((
                dsl::wins.eq(dsl::wins + win),
                dsl::losses.eq(dsl::losses + loss),
                dsl::draws.eq(dsl::draws + draw),
                dsl::total_games.eq(dsl::total_games + 1),
                dsl::updated_at.eq(now),
            ))
            .returning(User::as_returning())
            .get_result(&mut conn)
            .optional()?;

        match &user {
            Some(u) => info!(
                user_id,
                ?outcome,
                total_games = u.total_games(),
                "Account stats updated"
            ),
            None => warn!(user_id, "Account missing while applying result"),
        }
        Ok(user)
    }

    /// Lists active accounts with at least `min_games` rounds played.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_active_users(&self, min_games: i32) -> Result<Vec<User>, DbError> {
        let mut conn = self.connection()?;
        let users = schema::users::table
            .filter(schema::users::is_active.eq(true))
            .filter(schema::users::total_games.ge(min_games))
            .order(schema::users::id.asc())
            .select(User::as_select())
            .load(&mut conn)?;
        debug!(count = users.len(), "Active users loaded");
        Ok(users)
    }

    /// Counts active accounts ranked above the given record: more wins, or
    /// equal wins and more rounds played.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn count_users_ranked_above(&self, wins: i32, total_games: i32) -> Result<i64, DbError> {
        use schema::users::dsl;

        let mut conn = self.connection()?;
        Ok(dsl::users
            .filter(dsl::is_active.eq(true))
            .filter(
                dsl::wins
                    .gt(wins)
                    .or(dsl::wins.eq(wins).and(dsl::total_games.gt(total_games))),
            )
            .count()
            .get_result(&mut conn)?)
    }

    /// Loads the accounts with the given ids.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_users(&self, ids: &[i32]) -> Result<Vec<User>, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::users::table
            .filter(schema::users::id.eq_any(ids))
            .select(User::as_select())
            .load(&mut conn)?)
    }

    // ─────────────────────────────────────────────────────────────
    //  Sessions
    // ─────────────────────────────────────────────────────────────

    /// Creates a new game session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(
        skip(self, new_session),
        fields(player1 = %new_session.player1_name(), player2 = %new_session.player2_name())
    )]
    pub fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, DbError> {
        let mut conn = self.connection()?;
        let session = diesel::insert_into(schema::game_sessions::table)
            .values(&new_session)
            .returning(SessionRecord::as_returning())
            .get_result(&mut conn)?;
        info!(session_id = session.id(), "Session created");
        Ok(session)
    }

    /// Gets a session row by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_session(&self, session_id: i32) -> Result<Option<SessionRecord>, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::game_sessions::table
            .find(session_id)
            .select(SessionRecord::as_select())
            .first(&mut conn)
            .optional()?)
    }

    /// Gets a session with its decoded round history.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs or stored history is malformed.
    #[instrument(skip(self))]
    pub fn get_session_snapshot(
        &self,
        session_id: i32,
    ) -> Result<Option<SessionSnapshot>, DbError> {
        let mut conn = self.connection()?;
        let Some(session) = schema::game_sessions::table
            .find(session_id)
            .select(SessionRecord::as_select())
            .first(&mut conn)
            .optional()?
        else {
            debug!(session_id, "Session not found");
            return Ok(None);
        };

        let rounds = RoundRecord::belonging_to(&session)
            .order(schema::game_rounds::id.asc())
            .select(RoundRecord::as_select())
            .load(&mut conn)?;
        let moves = MoveRecord::belonging_to(&rounds)
            .order(schema::round_moves::seq.asc())
            .select(MoveRecord::as_select())
            .load(&mut conn)?;

        let game_history = moves
            .grouped_by(&rounds)
            .into_iter()
            .zip(&rounds)
            .map(|(round_moves, round)| {
                Ok(RoundSnapshot {
                    winner: RoundWinner::from_db_string(round.winner())?,
                    board: serde_json::from_str::<Board>(round.board())?,
                    moves: round_moves
                        .iter()
                        .map(MoveRecord::to_round_move)
                        .collect::<Result<_, DbError>>()?,
                    completed_at: *round.completed_at(),
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(Some(SessionSnapshot {
            session,
            game_history,
        }))
    }

    /// Lists sessions newest first. Returns the page and the total match count.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_sessions(
        &self,
        filter: &SessionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<SessionRecord>, i64), DbError> {
        use schema::game_sessions::dsl;

        let mut conn = self.connection()?;
        let mut page = dsl::game_sessions
            .select(SessionRecord::as_select())
            .into_boxed();
        let mut count = dsl::game_sessions
            .select(diesel::dsl::count_star())
            .into_boxed();

        if let Some(kind) = filter.session_type {
            page = page.filter(dsl::session_type.eq(kind.to_string()));
            count = count.filter(dsl::session_type.eq(kind.to_string()));
        }
        if let Some(active) = filter.is_active {
            page = page.filter(dsl::is_active.eq(active));
            count = count.filter(dsl::is_active.eq(active));
        }

        let total = count.get_result::<i64>(&mut conn)?;
        let sessions = page
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .offset(offset)
            .limit(limit)
            .load(&mut conn)?;

        info!(count = sessions.len(), total, "Sessions listed");
        Ok((sessions, total))
    }

    /// Lists sessions an account played in, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn sessions_for_user(
        &self,
        user_id: i32,
        limit: Option<i64>,
    ) -> Result<Vec<SessionRecord>, DbError> {
        use schema::game_sessions::dsl;

        let mut conn = self.connection()?;
        let mut query = dsl::game_sessions
            .filter(dsl::player1_id.eq(user_id).or(dsl::player2_id.eq(user_id)))
            .order((dsl::updated_at.desc(), dsl::id.desc()))
            .select(SessionRecord::as_select())
            .into_boxed();
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.load(&mut conn)?)
    }

    /// Overrides session counters. Returns `None` if the session is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn update_counters(
        &self,
        session_id: i32,
        counters: SessionCounters,
    ) -> Result<Option<SessionRecord>, DbError> {
        let mut conn = self.connection()?;
        let now = Utc::now().naive_utc();
        let session = diesel::update(schema::game_sessions::table.find(session_id))
            .set((counters, schema::game_sessions::updated_at.eq(now)))
            .returning(SessionRecord::as_returning())
            .get_result(&mut conn)
            .optional()?;
        if session.is_some() {
            info!(session_id, "Session counters updated");
        }
        Ok(session)
    }

    /// Appends a completed round and bumps the session counters in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the session is missing or a database error occurs.
    #[instrument(skip(self, round), fields(winner = ?round.winner, moves = round.moves.len()))]
    pub fn record_round(
        &self,
        session_id: i32,
        round: CompletedRound,
    ) -> Result<SessionRecord, DbError> {
        use schema::game_sessions::dsl;

        let mut conn = self.connection()?;
        let board = serde_json::to_string(&round.board)?;
        let now = Utc::now().naive_utc();

        let session = conn.transaction::<SessionRecord, DbError, _>(|conn| {
            let exists = dsl::game_sessions
                .find(session_id)
                .select(dsl::id)
                .first::<i32>(conn)
                .optional()?;
            if exists.is_none() {
                return Err(DbError::new(format!("Game session {} not found", session_id)));
            }

            let round_id = diesel::insert_into(schema::game_rounds::table)
                .values(&NewRound {
                    session_id,
                    winner: round.winner.to_db_string().to_string(),
                    board,
                    completed_at: now,
                })
                .returning(schema::game_rounds::id)
                .get_result::<i32>(conn)?;

            let moves: Vec<NewMove> = round
                .moves
                .iter()
                .enumerate()
                .map(|(seq, mv)| NewMove {
                    round_id,
                    seq: seq as i32,
                    symbol: mv.player.to_string(),
                    position: mv.position.index() as i32,
                    played_at: mv.timestamp,
                })
                .collect();
            if !moves.is_empty() {
                diesel::insert_into(schema::round_moves::table)
                    .values(&moves)
                    .execute(conn)?;
            }

            let (p1, p2, draw) = match round.winner {
                RoundWinner::Player1 => (1, 0, 0),
                RoundWinner::Player2 => (0, 1, 0),
                RoundWinner::Draw => (0, 0, 1),
            };
            Ok(diesel::update(dsl::game_sessions.find(session_id))
                .set((
                    dsl::player1_wins.eq(dsl::player1_wins + p1),
                    dsl::player2_wins.eq(dsl::player2_wins + p2),
                    dsl::draws.eq(dsl::draws + draw),
                    dsl::total_rounds.eq(dsl::total_rounds + 1),
                    dsl::updated_at.eq(now),
                ))
                .returning(SessionRecord::as_returning())
                .get_result(conn)?)
        })?;

        info!(
            session_id,
            total_rounds = session.total_rounds(),
            player1_wins = session.player1_wins(),
            player2_wins = session.player2_wins(),
            draws = session.draws(),
            "Round recorded"
        );
        Ok(session)
    }

    /// Deletes a session if it has no completed rounds. Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn delete_session_if_empty(&self, session_id: i32) -> Result<bool, DbError> {
        use schema::game_sessions::dsl;

        let mut conn = self.connection()?;
        let deleted = diesel::delete(
            dsl::game_sessions
                .filter(dsl::id.eq(session_id))
                .filter(dsl::total_rounds.eq(0)),
        )
        .execute(&mut conn)?;
        if deleted > 0 {
            info!(session_id, "Deleted empty session");
        }
        Ok(deleted > 0)
    }

    /// Deletes every zero-round session except the listed ones.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn delete_empty_sessions_except(&self, keep: &[i32]) -> Result<usize, DbError> {
        use schema::game_sessions::dsl;

        let mut conn = self.connection()?;
        let deleted = diesel::delete(
            dsl::game_sessions
                .filter(dsl::total_rounds.eq(0))
                .filter(dsl::id.ne_all(keep)),
        )
        .execute(&mut conn)?;
        if deleted > 0 {
            info!(count = deleted, "Deleted empty sessions");
        }
        Ok(deleted)
    }
}
