//! Keeps persisted sessions in step with live rooms.

use std::sync::Arc;
use std::time::Duration;

use duel_tictactoe::Symbol;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::db::{CompletedRound, DbError, NewSession, RoundWinner, Seat, SessionSnapshot};
use crate::room::{Room, RoomRegistry};
use crate::store::SessionStore;

/// Counts from one idle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rooms evicted for age.
    pub rooms_evicted: usize,
    /// Zero-round sessions deleted.
    pub sessions_deleted: usize,
}

/// Session bookkeeping driven by room lifecycle events.
#[derive(Debug, Clone)]
pub struct SessionReconciler {
    store: Arc<dyn SessionStore>,
}

impl SessionReconciler {
    /// Creates a reconciler over a store.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Links a session for the seated pair once both seats are filled.
    ///
    /// A linked session that belongs to a different pair (a new player took
    /// a freed seat) is unlinked, cleaned up if empty, and replaced. A
    /// storage failure is logged and leaves the room unlinked.
    #[instrument(skip(self, room), fields(code = %room.code()))]
    pub async fn ensure_created(&self, room: &mut Room) {
        let [first, second] = room.players().as_slice() else {
            return;
        };
        let (first, second) = (first.clone(), second.clone());

        if let Some(session_id) = *room.session_id() {
            match self.store.find_session(session_id).await {
                Ok(Some(current)) if current.session.is_between(&first.name, &second.name) => {
                    return;
                }
                Ok(Some(_)) => {
                    info!(session_id, "Seated pair changed, replacing session");
                }
                Ok(None) => warn!(session_id, "Linked session no longer exists"),
                Err(e) => {
                    error!(session_id, error = %e, "Failed to check linked session");
                    return;
                }
            }
            room.clear_session_id();
            self.spawn_cleanup(session_id);
        }

        let new_session = NewSession::for_players(
            first.name,
            second.name,
            first.account_id,
            second.account_id,
        );
        match self.store.create_session(new_session).await {
            Ok(session) => {
                info!(session_id = session.id(), "Session linked to room");
                room.set_session_id(*session.id());
            }
            Err(e) => error!(error = %e, "Failed to create session"),
        }
    }

    /// Loads the room's session for a broadcast. Failures are logged and
    /// yield `None`.
    #[instrument(skip(self, room), fields(code = %room.code()))]
    pub async fn snapshot(&self, room: &Room) -> Option<SessionSnapshot> {
        let session_id = (*room.session_id())?;
        match self.store.find_session(session_id).await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                warn!(session_id, "Linked session no longer exists");
                None
            }
            Err(e) => {
                error!(session_id, error = %e, "Failed to fetch session");
                None
            }
        }
    }

    /// Appends the finished round to the room's session, then updates each
    /// linked account. Returns the refreshed session for the broadcast.
    ///
    /// The winning symbol is resolved to a player name and the name to a
    /// session seat, since symbols swap between rounds and names do not.
    #[instrument(skip(self, room), fields(code = %room.code()))]
    pub async fn record_round(
        &self,
        room: &Room,
        winner: Option<Symbol>,
    ) -> Option<SessionSnapshot> {
        let Some(session_id) = *room.session_id() else {
            warn!("Room has no session, round not persisted");
            return None;
        };

        let current = self.snapshot(room).await?;
        let round_winner = match winner {
            None => RoundWinner::Draw,
            Some(symbol) => {
                let Some(player) = room.player_with_symbol(symbol) else {
                    error!(%symbol, "No player holds the winning symbol");
                    return None;
                };
                let Some(seat) = current.session.seat_of(&player.name) else {
                    error!(name = %player.name, "Winner does not match session players");
                    return None;
                };
                RoundWinner::seat(seat)
            }
        };

        let round = CompletedRound::new(
            round_winner,
            room.state().board.clone(),
            room.moves().clone(),
        );
        if let Err(e) = self.store.record_round(session_id, round).await {
            error!(session_id, error = %e, "Failed to record round");
            return None;
        }

        for seat in [Seat::Player1, Seat::Player2] {
            let Some(user_id) = current.session.account_for(seat) else {
                continue;
            };
            let outcome = round_winner.outcome_for(seat);
            if let Err(e) = self.store.apply_account_result(user_id, outcome).await {
                error!(user_id, ?outcome, error = %e, "Failed to update account stats");
            }
        }

        self.snapshot(room).await
    }

    /// Deletes a session if no round was completed.
    #[instrument(skip(self))]
    pub async fn cleanup_if_empty(&self, session_id: i32) -> Result<bool, DbError> {
        let deleted = self.store.delete_if_empty(session_id).await?;
        if !deleted {
            debug!(session_id, "Session kept, rounds were played");
        }
        Ok(deleted)
    }

    /// Runs [`Self::cleanup_if_empty`] as a detached task.
    pub fn spawn_cleanup(&self, session_id: i32) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = reconciler.cleanup_if_empty(session_id).await {
                error!(session_id, error = %e, "Abandoned session cleanup failed");
            }
        })
    }

    /// Deletes every zero-round session. Run once before serving.
    #[instrument(skip(self))]
    pub async fn startup_sweep(&self) -> Result<usize, DbError> {
        let deleted = self.store.delete_all_empty(Vec::new()).await?;
        info!(deleted, "Startup sweep complete");
        Ok(deleted)
    }

    /// Evicts rooms older than `ttl`, cleans their sessions, then deletes
    /// zero-round sessions no live room points at.
    #[instrument(skip(self, registry))]
    pub async fn sweep_idle(
        &self,
        registry: &RoomRegistry,
        ttl: Duration,
    ) -> Result<SweepReport, DbError> {
        let mut report = SweepReport::default();

        for code in registry.idle_since(ttl) {
            let Some(room) = registry.remove(&code) else {
                continue;
            };
            report.rooms_evicted += 1;
            let session_id = *room.lock().await.session_id();
            if let Some(session_id) = session_id {
                match self.cleanup_if_empty(session_id).await {
                    Ok(true) => report.sessions_deleted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(%code, session_id, error = %e, "Cleanup of evicted room failed")
                    }
                }
            }
        }

        let mut live = Vec::new();
        for room in registry.rooms() {
            if let Some(session_id) = *room.lock().await.session_id() {
                live.push(session_id);
            }
        }
        report.sessions_deleted += self.store.delete_all_empty(live).await?;

        if report.rooms_evicted > 0 || report.sessions_deleted > 0 {
            info!(
                rooms_evicted = report.rooms_evicted,
                sessions_deleted = report.sessions_deleted,
                live_rooms = registry.len(),
                "Idle sweep complete"
            );
        }
        Ok(report)
    }

    /// Runs [`Self::sweep_idle`] every `interval` until the task is aborted.
    pub fn spawn_sweeper(
        &self,
        registry: Arc<RoomRegistry>,
        ttl: Duration,
        interval: Duration,
    ) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = reconciler.sweep_idle(&registry, ttl).await {
                    error!(error = %e, "Idle sweep failed");
                }
            }
        })
    }
}
