//! Live match rooms and the registry that owns them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use derive_getters::Getters;
use derive_more::Display;
use duel_tictactoe::{Board, GameStatus, Position, Symbol};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::coordinator::CoordinatorError;
use crate::db::RoundMove;

const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Transient id of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Six-character room code from `[A-Z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Generates a random code.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_CHARSET[rng.random_range(0..ROOM_CODE_CHARSET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalizes a client-supplied code (trimmed, upper-cased).
    pub fn from_client(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Current connection. Rebound on reconnect.
    #[serde(rename = "id")]
    pub connection: ConnectionId,
    /// Display name. Stable across rounds.
    pub name: String,
    /// Symbol for the current round.
    pub symbol: Symbol,
    /// Linked account, if the player authenticated.
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i32>,
}

/// Client-visible round state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// The nine cells.
    pub board: Board,
    /// Symbol to move next.
    pub current_turn: Symbol,
    /// Winner of the finished round.
    pub winner: Option<Symbol>,
    /// Whether the finished round was a draw.
    pub is_draw: bool,
    /// True only while a round is in progress.
    pub is_active: bool,
    /// Rounds started in this room.
    pub round_count: u32,
}

impl GameState {
    fn fresh() -> Self {
        Self {
            board: Board::new(),
            current_turn: Symbol::X,
            winner: None,
            is_draw: false,
            is_active: false,
            round_count: 0,
        }
    }
}

/// Result of an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveApplied {
    /// Symbol that moved.
    pub symbol: Symbol,
    /// Cell that was filled.
    pub position: Position,
    /// Board status after the move.
    pub status: GameStatus,
}

/// How a `join_existing_room` request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejoin {
    /// An existing seat was rebound to the new connection.
    Rebound,
    /// The free seat was taken with the requested symbol.
    LateJoined,
}

/// Ready-up tally after a player confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyStatus {
    /// Confirmed players.
    pub ready_count: usize,
    /// Seated players.
    pub total_players: usize,
    /// Name of the player who just confirmed.
    pub player_ready: String,
}

/// One live match room.
#[derive(Debug, Clone, Getters)]
pub struct Room {
    code: RoomCode,
    players: Vec<Player>,
    state: GameState,
    #[getter(skip)]
    ready: HashSet<ConnectionId>,
    session_id: Option<i32>,
    moves: Vec<RoundMove>,
    created_at: NaiveDateTime,
}

impl Room {
    /// Opens a room with its creator seated as X.
    #[instrument(skip(code, name), fields(code = %code))]
    pub fn new(
        code: RoomCode,
        connection: ConnectionId,
        name: String,
        account_id: Option<i32>,
    ) -> Self {
        Self {
            code,
            players: vec![Player {
                connection,
                name,
                symbol: Symbol::X,
                account_id,
            }],
            state: GameState::fresh(),
            ready: HashSet::new(),
            session_id: None,
            moves: Vec::new(),
            created_at: Utc::now().naive_utc(),
        }
    }

    /// The player bound to `connection`.
    pub fn player(&self, connection: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection == connection)
    }

    /// The player holding `symbol` this round.
    pub fn player_with_symbol(&self, symbol: Symbol) -> Option<&Player> {
        self.players.iter().find(|p| p.symbol == symbol)
    }

    /// Connections of every seated player.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.players.iter().map(|p| p.connection).collect()
    }

    /// Whether both seats are taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    /// Links the persisted session.
    pub fn set_session_id(&mut self, session_id: i32) {
        self.session_id = Some(session_id);
    }

    /// Unlinks the persisted session. Returns the id that was linked.
    pub fn clear_session_id(&mut self) -> Option<i32> {
        self.session_id.take()
    }

    /// Whether the current board already holds a win or a draw.
    fn round_over(&self) -> bool {
        self.state.winner.is_some() || self.state.is_draw
    }

    /// Seats a second player and starts round one. A finished board stays
    /// inactive until both players are ready.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RoomFull`] if both seats are taken.
    #[instrument(skip(self, name), fields(code = %self.code))]
    pub fn join(
        &mut self,
        connection: ConnectionId,
        name: String,
        account_id: Option<i32>,
    ) -> Result<Symbol, CoordinatorError> {
        if self.is_full() {
            warn!("Join rejected, room full");
            return Err(CoordinatorError::RoomFull);
        }

        let symbol = self
            .players
            .first()
            .map(|p| p.symbol.opponent())
            .unwrap_or(Symbol::O);
        self.players.push(Player {
            connection,
            name,
            symbol,
            account_id,
        });
        self.state.is_active = !self.round_over();
        if self.state.round_count == 0 {
            self.state.round_count = 1;
        }

        info!(%symbol, players = self.players.len(), "Player joined");
        Ok(symbol)
    }

    /// Rebinds a returning player, or late-joins into the free seat.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RejoinRejected`] if neither applies.
    #[instrument(skip(self, name), fields(code = %self.code))]
    pub fn rejoin(
        &mut self,
        connection: ConnectionId,
        name: String,
        symbol: Symbol,
        account_id: Option<i32>,
    ) -> Result<Rejoin, CoordinatorError> {
        if let Some(existing) = self
            .players
            .iter_mut()
            .find(|p| p.name == name && p.symbol == symbol)
        {
            let previous = std::mem::replace(&mut existing.connection, connection);
            if existing.account_id.is_none() {
                existing.account_id = account_id;
            }
            if self.ready.remove(&previous) {
                self.ready.insert(connection);
            }
            info!(%symbol, "Player rebound to new connection");
            return Ok(Rejoin::Rebound);
        }

        if self.players.len() == 1 && self.player_with_symbol(symbol).is_none() {
            self.players.push(Player {
                connection,
                name,
                symbol,
                account_id,
            });
            self.state.is_active = !self.round_over();
            info!(%symbol, active = self.state.is_active, "Player late-joined");
            return Ok(Rejoin::LateJoined);
        }

        warn!(%symbol, "Rejoin rejected");
        Err(CoordinatorError::RejoinRejected)
    }

    /// Unseats the player bound to `connection`.
    #[instrument(skip(self), fields(code = %self.code))]
    pub fn remove(&mut self, connection: ConnectionId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.connection == connection)?;
        let player = self.players.remove(index);
        self.ready.remove(&connection);
        if !self.players.is_empty() {
            self.state.is_active = false;
        }
        info!(name = %player.name, remaining = self.players.len(), "Player left room");
        Some(player)
    }

    /// Validates and applies a move.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] if the round is inactive, the connection
    /// is not seated or not on turn, or the cell is occupied or off the board.
    #[instrument(skip(self), fields(code = %self.code))]
    pub fn play(
        &mut self,
        connection: ConnectionId,
        position: i64,
    ) -> Result<MoveApplied, CoordinatorError> {
        if !self.state.is_active {
            return Err(CoordinatorError::GameNotActive);
        }

        let symbol = match self.player(connection) {
            Some(player) if player.symbol == self.state.current_turn => player.symbol,
            _ => return Err(CoordinatorError::NotYourTurn),
        };

        let position = usize::try_from(position)
            .ok()
            .and_then(|index| Position::new(index).ok())
            .ok_or(CoordinatorError::PositionTaken)?;
        self.state
            .board
            .place(position, symbol)
            .map_err(|_| CoordinatorError::PositionTaken)?;

        self.moves
            .push(RoundMove::new(symbol, position, Utc::now().naive_utc()));
        self.state.current_turn = symbol.opponent();

        let status = self.state.board.status();
        match status {
            GameStatus::Won(winner) => {
                self.state.winner = Some(winner);
                self.state.is_active = false;
                info!(%winner, moves = self.moves.len(), "Round won");
            }
            GameStatus::Draw => {
                self.state.is_draw = true;
                self.state.is_active = false;
                info!(moves = self.moves.len(), "Round drawn");
            }
            GameStatus::InProgress => {
                debug!(%symbol, %position, "Move accepted");
            }
        }

        Ok(MoveApplied {
            symbol,
            position,
            status,
        })
    }

    /// Records readiness. Returns `None` if `connection` is not seated.
    #[instrument(skip(self), fields(code = %self.code))]
    pub fn mark_ready(&mut self, connection: ConnectionId) -> Option<ReadyStatus> {
        let name = self.player(connection)?.name.clone();
        self.ready.insert(connection);
        Some(ReadyStatus {
            ready_count: self.ready.len(),
            total_players: self.players.len(),
            player_ready: name,
        })
    }

    /// Whether both seated players confirmed the next round.
    pub fn all_ready(&self) -> bool {
        self.players.len() == 2 && self.players.iter().all(|p| self.ready.contains(&p.connection))
    }

    /// Starts the next round. Swaps symbols when a round was started before.
    /// Returns whether the symbols were swapped.
    #[instrument(skip(self), fields(code = %self.code))]
    pub fn advance_round(&mut self) -> bool {
        let swapped = self.state.round_count > 0 && self.players.len() == 2;
        if swapped {
            for player in &mut self.players {
                player.symbol = player.symbol.opponent();
            }
        }

        self.state.round_count += 1;
        self.state.board.reset();
        self.state.current_turn = Symbol::X;
        self.state.winner = None;
        self.state.is_draw = false;
        self.state.is_active = true;
        self.moves.clear();
        self.ready.clear();

        info!(round = self.state.round_count, swapped, "Round started");
        swapped
    }
}

/// Shared handle to a room. Hold the lock for a whole operation.
pub type SharedRoom = Arc<tokio::sync::Mutex<Room>>;

#[derive(Debug)]
struct RoomEntry {
    room: SharedRoom,
    opened: Instant,
}

/// Owns every live room and the connection-to-room index.
///
/// The maps sit behind short-lived std locks that are never held across an
/// await; each room has its own async lock.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomCode, RoomEntry>>,
    members: Mutex<HashMap<ConnectionId, RoomCode>>,
}

fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating room registry");
        Self::default()
    }

    /// Opens a room for a creator, re-rolling codes that collide with a live room.
    #[instrument(skip(self, name))]
    pub fn create(
        &self,
        connection: ConnectionId,
        name: String,
        account_id: Option<i32>,
    ) -> (RoomCode, SharedRoom) {
        let mut rooms = guard(&self.rooms);
        let code = loop {
            let candidate = RoomCode::generate();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
            debug!(code = %candidate, "Room code collision, re-rolling");
        };

        let room = Arc::new(tokio::sync::Mutex::new(Room::new(
            code.clone(),
            connection,
            name,
            account_id,
        )));
        rooms.insert(
            code.clone(),
            RoomEntry {
                room: Arc::clone(&room),
                opened: Instant::now(),
            },
        );
        drop(rooms);

        self.bind(connection, code.clone());
        info!(%code, "Room created");
        (code, room)
    }

    /// Looks up a room.
    pub fn get(&self, code: &RoomCode) -> Option<SharedRoom> {
        guard(&self.rooms).get(code).map(|entry| Arc::clone(&entry.room))
    }

    /// Removes a room. Returns it if it was live.
    #[instrument(skip(self))]
    pub fn remove(&self, code: &RoomCode) -> Option<SharedRoom> {
        let removed = guard(&self.rooms).remove(code).map(|entry| entry.room);
        if removed.is_some() {
            guard(&self.members).retain(|_, member_of| member_of != code);
            info!(%code, "Room removed");
        }
        removed
    }

    /// Records that `connection` is seated in `code`.
    pub fn bind(&self, connection: ConnectionId, code: RoomCode) {
        guard(&self.members).insert(connection, code);
    }

    /// Forgets the membership of `connection`.
    pub fn unbind(&self, connection: ConnectionId) -> Option<RoomCode> {
        guard(&self.members).remove(&connection)
    }

    /// The room `connection` is seated in.
    pub fn room_of(&self, connection: ConnectionId) -> Option<RoomCode> {
        guard(&self.members).get(&connection).cloned()
    }

    /// Codes of rooms opened at least `threshold` ago.
    pub fn idle_since(&self, threshold: Duration) -> Vec<RoomCode> {
        guard(&self.rooms)
            .iter()
            .filter(|(_, entry)| entry.opened.elapsed() >= threshold)
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Handles to every live room.
    pub fn rooms(&self) -> Vec<SharedRoom> {
        guard(&self.rooms)
            .values()
            .map(|entry| Arc::clone(&entry.room))
            .collect()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        guard(&self.rooms).len()
    }

    /// Whether no rooms are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
