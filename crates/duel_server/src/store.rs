//! Async storage seam used by the live-room subsystem.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::db::{
    CompletedRound, DbError, GameOutcome, GameRepository, NewSession, SessionRecord,
    SessionSnapshot,
};

/// Persisted-session operations the coordinator needs.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Inserts a new session row.
    async fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, DbError>;

    /// Loads a session with its round history.
    async fn find_session(&self, session_id: i32) -> Result<Option<SessionSnapshot>, DbError>;

    /// Appends a completed round and bumps the session counters atomically.
    async fn record_round(
        &self,
        session_id: i32,
        round: CompletedRound,
    ) -> Result<SessionRecord, DbError>;

    /// Deletes the session if it has no completed rounds.
    async fn delete_if_empty(&self, session_id: i32) -> Result<bool, DbError>;

    /// Deletes every zero-round session not listed in `keep`.
    async fn delete_all_empty(&self, keep: Vec<i32>) -> Result<usize, DbError>;

    /// Adds one round result to an account's counters.
    async fn apply_account_result(
        &self,
        user_id: i32,
        outcome: GameOutcome,
    ) -> Result<(), DbError>;
}

/// [`SessionStore`] backed by the SQLite repository, run on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    repo: GameRepository,
}

impl SqliteSessionStore {
    /// Wraps a repository.
    pub fn new(repo: GameRepository) -> Self {
        Self { repo }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(GameRepository) -> Result<T, DbError> + Send + 'static,
    {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || op(repo)).await?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self, new_session))]
    async fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, DbError> {
        self.blocking(move |repo| repo.create_session(new_session)).await
    }

    #[instrument(skip(self))]
    async fn find_session(&self, session_id: i32) -> Result<Option<SessionSnapshot>, DbError> {
        self.blocking(move |repo| repo.get_session_snapshot(session_id)).await
    }

    #[instrument(skip(self, round))]
    async fn record_round(
        &self,
        session_id: i32,
        round: CompletedRound,
    ) -> Result<SessionRecord, DbError> {
        self.blocking(move |repo| repo.record_round(session_id, round)).await
    }

    #[instrument(skip(self))]
    async fn delete_if_empty(&self, session_id: i32) -> Result<bool, DbError> {
        self.blocking(move |repo| repo.delete_session_if_empty(session_id)).await
    }

    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    async fn delete_all_empty(&self, keep: Vec<i32>) -> Result<usize, DbError> {
        self.blocking(move |repo| repo.delete_empty_sessions_except(&keep)).await
    }

    #[instrument(skip(self))]
    async fn apply_account_result(
        &self,
        user_id: i32,
        outcome: GameOutcome,
    ) -> Result<(), DbError> {
        let updated = self
            .blocking(move |repo| repo.apply_account_result(user_id, outcome))
            .await?;
        if updated.is_none() {
            debug!(user_id, "No account row to update");
        }
        Ok(())
    }
}
