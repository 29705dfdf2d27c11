//! Per-room match state machine.
//!
//! Every operation locks the target room for its whole duration, storage
//! awaits included, and returns an [`Outcome`]: an optional reply for the
//! caller plus events addressed to room members. The gateway delivers both.

use std::sync::Arc;

use chrono::Utc;
use derive_more::Display;
use duel_tictactoe::{GameStatus, Symbol};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::Credentials;
use crate::db::SessionSnapshot;
use crate::protocol::{
    ChatMessage, ClientMessage, CreateRoom, JoinExistingRoom, JoinRoom, MakeMove, MoveMade,
    PlayerLeft, Reply, RoomRef, RoomSnapshot, SendMessage, ServerEvent,
};
use crate::reconcile::SessionReconciler;
use crate::room::{ConnectionId, Rejoin, Room, RoomCode, RoomRegistry};

const MAX_NAME_LEN: usize = 50;

/// Why an intent was rejected. Nothing is mutated on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CoordinatorError {
    /// No live room has that code.
    #[display("Room not found")]
    RoomNotFound,
    /// Both seats are taken.
    #[display("Room is full")]
    RoomFull,
    /// No matching seat to rebind and no free seat for the requested symbol.
    #[display("Room is full or invalid")]
    RejoinRejected,
    /// The room is missing or no round is in progress.
    #[display("Game not active")]
    GameNotActive,
    /// The caller is not seated or does not hold the current turn.
    #[display("Not your turn")]
    NotYourTurn,
    /// The cell is occupied or off the board.
    #[display("Position already taken")]
    PositionTaken,
    /// The other seat already uses that name.
    #[display("Player name already taken in this room")]
    NameTaken,
    /// The connection already holds a seat in this room.
    #[display("Already seated in this room")]
    AlreadySeated,
    /// Malformed input.
    #[display("{}", _0)]
    InvalidInput(String),
}

impl std::error::Error for CoordinatorError {}

impl CoordinatorError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::RoomFull => "ROOM_FULL",
            Self::RejoinRejected => "ROOM_FULL_OR_INVALID",
            Self::GameNotActive => "GAME_NOT_ACTIVE",
            Self::NotYourTurn => "NOT_YOUR_TURN",
            Self::PositionTaken => "POSITION_TAKEN",
            Self::NameTaken => "NAME_TAKEN",
            Self::AlreadySeated => "ALREADY_SEATED",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

/// An event and the connections it goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Recipients.
    pub to: Vec<ConnectionId>,
    /// Payload.
    pub event: ServerEvent,
}

/// What an operation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Reply for the caller. `None` when the intent carries no reply payload.
    pub reply: Option<Reply>,
    /// Events for room members.
    pub events: Vec<Envelope>,
}

impl Outcome {
    /// Nothing to say to anyone.
    pub fn none() -> Self {
        Self::default()
    }

    fn reply(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            events: Vec::new(),
        }
    }

    fn with_event(mut self, to: Vec<ConnectionId>, event: ServerEvent) -> Self {
        self.events.push(Envelope { to, event });
        self
    }
}

fn validate_name(raw: &str) -> Result<String, CoordinatorError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CoordinatorError::InvalidInput("Player name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoordinatorError::InvalidInput(format!(
            "Player name must be {} characters or fewer",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Drives every live room.
#[derive(Debug, Clone)]
pub struct MatchCoordinator {
    registry: Arc<RoomRegistry>,
    reconciler: SessionReconciler,
    credentials: Credentials,
}

impl MatchCoordinator {
    /// Creates a coordinator over a registry and session reconciler.
    #[instrument(skip_all)]
    pub fn new(
        registry: Arc<RoomRegistry>,
        reconciler: SessionReconciler,
        credentials: Credentials,
    ) -> Self {
        info!("Creating match coordinator");
        Self {
            registry,
            reconciler,
            credentials,
        }
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Dispatches a parsed client intent.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the intent is rejected.
    pub async fn handle(
        &self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<Outcome, CoordinatorError> {
        match message {
            ClientMessage::CreateRoom(req) => self.create(connection, req).await,
            ClientMessage::JoinRoom(req) => self.join(connection, req).await,
            ClientMessage::JoinExistingRoom(req) => self.join_existing(connection, req).await,
            ClientMessage::MakeMove(req) => self.make_move(connection, req).await,
            ClientMessage::PlayerReady(req) => Ok(self.ready(connection, req).await),
            ClientMessage::NewRound(req) => Ok(self.new_round(connection, req).await),
            ClientMessage::SendMessage(req) => self.chat(connection, req).await,
        }
    }

    /// Locks a room and confirms it is still registered after the wait.
    async fn lock_live(&self, code: &RoomCode) -> Option<OwnedMutexGuard<Room>> {
        let room = self.registry.get(code)?;
        let guard = Arc::clone(&room).lock_owned().await;
        match self.registry.get(code) {
            Some(current) if Arc::ptr_eq(&current, &room) => Some(guard),
            _ => {
                debug!(%code, "Room removed while waiting for lock");
                None
            }
        }
    }

    fn room_snapshot(room: &Room, game_session: Option<SessionSnapshot>) -> RoomSnapshot {
        RoomSnapshot {
            room_code: room.code().clone(),
            players: room.players().clone(),
            game_state: room.state().clone(),
            game_session,
        }
    }

    /// Opens a room with the caller seated as X. A caller seated elsewhere
    /// leaves that room first.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidInput`] for a blank or overlong name.
    #[instrument(skip(self, req))]
    pub async fn create(
        &self,
        connection: ConnectionId,
        req: CreateRoom,
    ) -> Result<Outcome, CoordinatorError> {
        let name = validate_name(&req.player_name)?;
        let account_id = self.credentials.account_from(req.auth_token.as_deref());

        let previous = self.registry.room_of(connection);
        let (code, _room) = self.registry.create(connection, name, account_id);
        info!(%code, account_id, "Room opened");

        let outcome = Outcome::reply(Reply::seated(code.clone(), Symbol::X));
        Ok(self.leave_previous(connection, previous, &code, outcome).await)
    }

    /// Seats the caller in the free seat, links a session and announces the
    /// match. A caller seated in another room leaves it.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RoomNotFound`], [`CoordinatorError::RoomFull`],
    /// [`CoordinatorError::NameTaken`] or [`CoordinatorError::AlreadySeated`].
    #[instrument(skip(self, req), fields(code = %req.room_code))]
    pub async fn join(
        &self,
        connection: ConnectionId,
        req: JoinRoom,
    ) -> Result<Outcome, CoordinatorError> {
        let name = validate_name(&req.player_name)?;
        let code = RoomCode::from_client(&req.room_code);
        let mut room = self
            .lock_live(&code)
            .await
            .ok_or(CoordinatorError::RoomNotFound)?;

        if room.player(connection).is_some() {
            warn!("Join rejected, connection already seated here");
            return Err(CoordinatorError::AlreadySeated);
        }
        if room.is_full() {
            return Err(CoordinatorError::RoomFull);
        }
        if room.players().iter().any(|p| p.name == name) {
            warn!(%name, "Join rejected, duplicate name");
            return Err(CoordinatorError::NameTaken);
        }

        let account_id = self.credentials.account_from(req.auth_token.as_deref());
        let symbol = room.join(connection, name, account_id)?;
        let previous = self.registry.room_of(connection);
        self.registry.bind(connection, code.clone());

        self.reconciler.ensure_created(&mut room).await;
        let session = self.reconciler.snapshot(&room).await;
        let event = ServerEvent::GameReady(Self::room_snapshot(&room, session));
        let outcome = Outcome::reply(Reply::seated(code.clone(), symbol))
            .with_event(room.connections(), event);
        drop(room);

        Ok(self.leave_previous(connection, previous, &code, outcome).await)
    }

    /// Rebinds a returning player, or late-joins the free seat.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RoomNotFound`] or [`CoordinatorError::RejoinRejected`].
    #[instrument(skip(self, req), fields(code = %req.room_code, symbol = %req.player_symbol))]
    pub async fn join_existing(
        &self,
        connection: ConnectionId,
        req: JoinExistingRoom,
    ) -> Result<Outcome, CoordinatorError> {
        let name = validate_name(&req.player_name)?;
        let code = RoomCode::from_client(&req.room_code);
        let mut room = self
            .lock_live(&code)
            .await
            .ok_or(CoordinatorError::RoomNotFound)?;

        let account_id = self.credentials.account_from(req.auth_token.as_deref());
        let rejoin = room.rejoin(connection, name, req.player_symbol, account_id)?;
        let previous = self.registry.room_of(connection);
        self.registry.bind(connection, code.clone());

        let recipients = match rejoin {
            Rejoin::Rebound => vec![connection],
            Rejoin::LateJoined => {
                self.reconciler.ensure_created(&mut room).await;
                room.connections()
            }
        };
        let session = self.reconciler.snapshot(&room).await;
        let event = ServerEvent::GameReady(Self::room_snapshot(&room, session));
        let outcome = Outcome::reply(Reply::ok()).with_event(recipients, event);
        drop(room);

        Ok(self.leave_previous(connection, previous, &code, outcome).await)
    }

    /// Unseats `connection` from the room it sat in before taking a seat in
    /// `current`, and appends that room's events to `outcome`.
    async fn leave_previous(
        &self,
        connection: ConnectionId,
        previous: Option<RoomCode>,
        current: &RoomCode,
        mut outcome: Outcome,
    ) -> Outcome {
        match previous {
            Some(previous) if &previous != current => {
                info!(from = %previous, to = %current, "Connection moved to another room");
                outcome
                    .events
                    .extend(self.unseat(connection, &previous).await.events);
                outcome
            }
            _ => outcome,
        }
    }

    /// Applies the caller's move and persists the round if it ended.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::GameNotActive`], [`CoordinatorError::NotYourTurn`]
    /// or [`CoordinatorError::PositionTaken`].
    #[instrument(skip(self, req), fields(code = %req.room_code, position = req.position))]
    pub async fn make_move(
        &self,
        connection: ConnectionId,
        req: MakeMove,
    ) -> Result<Outcome, CoordinatorError> {
        let code = RoomCode::from_client(&req.room_code);
        let mut room = self
            .lock_live(&code)
            .await
            .ok_or(CoordinatorError::GameNotActive)?;

        let applied = room.play(connection, req.position)?;
        let game_session = match applied.status {
            GameStatus::InProgress => None,
            GameStatus::Won(winner) => self.reconciler.record_round(&room, Some(winner)).await,
            GameStatus::Draw => self.reconciler.record_round(&room, None).await,
        };

        let event = ServerEvent::MoveMade(MoveMade {
            position: applied.position,
            player: applied.symbol,
            game_state: room.state().clone(),
            game_session,
        });
        Ok(Outcome::reply(Reply::ok()).with_event(room.connections(), event))
    }

    /// Records readiness and starts the next round once both players confirmed.
    /// Unknown rooms and non-members are ignored.
    #[instrument(skip(self, req), fields(code = %req.room_code))]
    pub async fn ready(&self, connection: ConnectionId, req: RoomRef) -> Outcome {
        let code = RoomCode::from_client(&req.room_code);
        let Some(mut room) = self.lock_live(&code).await else {
            debug!("Ready for unknown room ignored");
            return Outcome::none();
        };
        let Some(status) = room.mark_ready(connection) else {
            debug!("Ready from non-member ignored");
            return Outcome::none();
        };

        let mut outcome =
            Outcome::none().with_event(room.connections(), ServerEvent::PlayerReadyStatus(status));
        if room.all_ready() {
            outcome.events.push(self.advance_round(&mut room).await);
        }
        outcome
    }

    /// Starts the next round immediately. Unknown rooms and non-members are ignored.
    #[instrument(skip(self, req), fields(code = %req.room_code))]
    pub async fn new_round(&self, connection: ConnectionId, req: RoomRef) -> Outcome {
        let code = RoomCode::from_client(&req.room_code);
        let Some(mut room) = self.lock_live(&code).await else {
            return Outcome::none();
        };
        if room.player(connection).is_none() {
            debug!("New round from non-member ignored");
            return Outcome::none();
        }
        let envelope = self.advance_round(&mut room).await;
        Outcome {
            reply: None,
            events: vec![envelope],
        }
    }

    async fn advance_round(&self, room: &mut Room) -> Envelope {
        room.advance_round();
        let session = self.reconciler.snapshot(room).await;
        Envelope {
            to: room.connections(),
            event: ServerEvent::NewRoundStarted(Self::room_snapshot(room, session)),
        }
    }

    /// Broadcasts a chat message from a seated player.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidInput`] for blank text. Unknown rooms
    /// and non-members are ignored.
    #[instrument(skip(self, req), fields(code = %req.room_code))]
    pub async fn chat(
        &self,
        connection: ConnectionId,
        req: SendMessage,
    ) -> Result<Outcome, CoordinatorError> {
        let code = RoomCode::from_client(&req.room_code);
        let Some(room) = self.lock_live(&code).await else {
            return Ok(Outcome::none());
        };
        let Some(player) = room.player(connection) else {
            return Ok(Outcome::none());
        };

        let text = req.message.trim();
        if text.is_empty() {
            return Err(CoordinatorError::InvalidInput(
                "Message cannot be empty".to_string(),
            ));
        }

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            player_name: player.name.clone(),
            player_symbol: player.symbol,
            message: text.to_string(),
            timestamp: Utc::now(),
        };
        debug!(name = %message.player_name, "Chat message");
        Ok(Outcome::none().with_event(room.connections(), ServerEvent::NewMessage(message)))
    }

    /// Unseats a closed connection. Keeps the room for a remaining player;
    /// otherwise removes it and cleans its session in the background.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, connection: ConnectionId) -> Outcome {
        let Some(code) = self.registry.unbind(connection) else {
            return Outcome::none();
        };
        self.unseat(connection, &code).await
    }

    async fn unseat(&self, connection: ConnectionId, code: &RoomCode) -> Outcome {
        let Some(mut room) = self.lock_live(code).await else {
            return Outcome::none();
        };
        let Some(player) = room.remove(connection) else {
            debug!(%code, "Connection was already rebound");
            return Outcome::none();
        };

        if room.players().is_empty() {
            self.registry.remove(code);
            if let Some(session_id) = *room.session_id() {
                self.reconciler.spawn_cleanup(session_id);
            }
            info!(%code, "Room emptied and removed");
            return Outcome::none();
        }

        Outcome::none().with_event(
            room.connections(),
            ServerEvent::PlayerDisconnected(PlayerLeft {
                player_name: player.name,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_and_codes() {
        assert_eq!(CoordinatorError::RoomNotFound.to_string(), "Room not found");
        assert_eq!(CoordinatorError::RoomFull.to_string(), "Room is full");
        assert_eq!(CoordinatorError::RejoinRejected.to_string(), "Room is full or invalid");
        assert_eq!(CoordinatorError::GameNotActive.to_string(), "Game not active");
        assert_eq!(CoordinatorError::NotYourTurn.to_string(), "Not your turn");
        assert_eq!(CoordinatorError::PositionTaken.to_string(), "Position already taken");
        assert_eq!(CoordinatorError::AlreadySeated.to_string(), "Already seated in this room");
        assert_eq!(CoordinatorError::PositionTaken.code(), "POSITION_TAKEN");
        assert_eq!(CoordinatorError::InvalidInput("x".into()).code(), "INVALID_INPUT");
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Alice ").unwrap(), "Alice");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(51)).is_err());
        assert!(validate_name(&"a".repeat(50)).is_ok());
    }
}
