//! Wire messages exchanged over the live channel.
//!
//! Client frames look like `{"event": "make_move", "data": {...}, "ack": 3}`.
//! Older clients send positional arguments instead of an object
//! (`"data": ["ABC123", 4]`); those are normalized here so the rest of the
//! server only sees [`ClientMessage`].

use chrono::{DateTime, Utc};
use derive_more::Display;
use duel_tictactoe::{Position, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::coordinator::CoordinatorError;
use crate::db::SessionSnapshot;
use crate::room::{GameState, Player, ReadyStatus, RoomCode};

/// `create_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoom {
    /// Display name of the creator.
    pub player_name: String,
    /// Optional bearer token linking an account.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// `join_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    /// Room to join.
    pub room_code: String,
    /// Display name of the joiner.
    pub player_name: String,
    /// Optional bearer token linking an account.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// `join_existing_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinExistingRoom {
    /// Room to rejoin.
    pub room_code: String,
    /// Name the player used before.
    pub player_name: String,
    /// Symbol the player held before.
    pub player_symbol: Symbol,
    /// Optional bearer token linking an account.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// `make_move` payload. The position is range-checked by the room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MakeMove {
    /// Room the move is for.
    pub room_code: String,
    /// Target cell, expected in `0..9`.
    pub position: i64,
}

/// Payload naming only a room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    /// Target room.
    pub room_code: String,
}

/// `send_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Target room.
    pub room_code: String,
    /// Chat text.
    pub message: String,
}

/// Every intent a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a room.
    CreateRoom(CreateRoom),
    /// Take the second seat of a room.
    JoinRoom(JoinRoom),
    /// Reconnect to a seat, or late-join the free one.
    JoinExistingRoom(JoinExistingRoom),
    /// Place the caller's symbol.
    MakeMove(MakeMove),
    /// Confirm readiness for the next round.
    PlayerReady(RoomRef),
    /// Start the next round immediately.
    NewRound(RoomRef),
    /// Post a chat message.
    SendMessage(SendMessage),
}

impl ClientMessage {
    /// Wire name of the intent.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create_room",
            Self::JoinRoom(_) => "join_room",
            Self::JoinExistingRoom(_) => "join_existing_room",
            Self::MakeMove(_) => "make_move",
            Self::PlayerReady(_) => "player_ready",
            Self::NewRound(_) => "new_round",
            Self::SendMessage(_) => "send_message",
        }
    }
}

/// A parsed client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// The intent.
    pub message: ClientMessage,
    /// Correlation id echoed on the reply.
    pub ack: Option<u64>,
}

/// Frame that could not be turned into a [`ClientMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ProtocolError {
    /// Not JSON, or not an object with an `event` string.
    #[display("Malformed frame: {}", _0)]
    Malformed(String),
    /// `event` names no known intent.
    #[display("Unknown event: {}", _0)]
    UnknownEvent(String),
    /// Payload fields missing or of the wrong type.
    #[display("Invalid payload for {}: {}", event, reason)]
    InvalidPayload {
        /// Event whose payload failed.
        event: String,
        /// Decoder message.
        reason: String,
    },
}

impl std::error::Error for ProtocolError {}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    ack: Option<u64>,
}

fn positional_fields(event: &str) -> Option<&'static [&'static str]> {
    Some(match event {
        "create_room" => &["playerName"],
        "join_room" => &["roomCode", "playerName"],
        "join_existing_room" => &["roomCode", "playerName", "playerSymbol"],
        "make_move" => &["roomCode", "position"],
        "player_ready" | "new_round" => &["roomCode"],
        "send_message" => &["roomCode", "message"],
        _ => return None,
    })
}

/// Parses one text frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is malformed, names an unknown
/// event, or carries an invalid payload.
#[instrument(skip(text), fields(len = text.len()))]
pub fn parse_frame(text: &str) -> Result<Inbound, ProtocolError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let fields = positional_fields(&raw.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(raw.event.clone()))?;

    let data = match raw.data {
        Value::Object(map) => Value::Object(map),
        Value::Array(args) => {
            debug!(event = %raw.event, "Normalizing positional payload");
            Value::Object(zip_positional(fields, args))
        }
        Value::Null => Value::Object(Map::new()),
        scalar => Value::Object(zip_positional(fields, vec![scalar])),
    };

    let tagged = serde_json::json!({ "event": raw.event, "data": data });
    let message = serde_json::from_value(tagged).map_err(|e| ProtocolError::InvalidPayload {
        event: raw.event.clone(),
        reason: e.to_string(),
    })?;

    Ok(Inbound {
        message,
        ack: raw.ack,
    })
}

fn zip_positional(fields: &[&str], args: Vec<Value>) -> Map<String, Value> {
    fields
        .iter()
        .zip(args)
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| ((*name).to_string(), value))
        .collect()
}

/// Room roster and state, sent on `game_ready` and `new_round_started`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room the snapshot is for.
    pub room_code: RoomCode,
    /// Seated players in join order.
    pub players: Vec<Player>,
    /// Current round state.
    pub game_state: GameState,
    /// Persisted standings, when available.
    pub game_session: Option<SessionSnapshot>,
}

/// `move_made` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMade {
    /// Filled cell.
    pub position: Position,
    /// Symbol that moved.
    pub player: Symbol,
    /// State after the move.
    pub game_state: GameState,
    /// Refreshed standings, only after a round-ending move.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_session: Option<SessionSnapshot>,
}

/// `player_disconnected` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeft {
    /// Name of the player who left.
    pub player_name: String,
}

/// `new_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message id.
    pub id: String,
    /// Author name.
    pub player_name: String,
    /// Author's symbol at send time.
    pub player_symbol: Symbol,
    /// Trimmed text.
    pub message: String,
    /// Send time.
    pub timestamp: DateTime<Utc>,
}

/// Events pushed to room members.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Both seats are filled, or a player reconnected.
    GameReady(RoomSnapshot),
    /// A move was accepted.
    MoveMade(MoveMade),
    /// A new round began.
    NewRoundStarted(RoomSnapshot),
    /// Someone confirmed readiness.
    PlayerReadyStatus(ReadyStatus),
    /// The opponent left.
    PlayerDisconnected(PlayerLeft),
    /// Chat message.
    NewMessage(ChatMessage),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::GameReady(_) => "game_ready",
            Self::MoveMade(_) => "move_made",
            Self::NewRoundStarted(_) => "new_round_started",
            Self::PlayerReadyStatus(_) => "player_ready_status",
            Self::PlayerDisconnected(_) => "player_disconnected",
            Self::NewMessage(_) => "new_message",
        }
    }
}

/// Reply to the connection that sent an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Whether the intent was accepted.
    pub success: bool,
    /// Room the caller is now seated in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_code: Option<RoomCode>,
    /// Caller's symbol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_symbol: Option<Symbol>,
    /// Stable rejection code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// Human-readable rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Accepted, no payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            room_code: None,
            player_symbol: None,
            code: None,
            error: None,
        }
    }

    /// Accepted, caller seated in `room_code` as `symbol`.
    pub fn seated(room_code: RoomCode, symbol: Symbol) -> Self {
        Self {
            room_code: Some(room_code),
            player_symbol: Some(symbol),
            ..Self::ok()
        }
    }

    /// Rejected by the coordinator.
    pub fn rejected(err: &CoordinatorError) -> Self {
        Self {
            success: false,
            code: Some(err.code()),
            error: Some(err.to_string()),
            ..Self::ok()
        }
    }

    /// Rejected at the frame boundary.
    pub fn invalid(err: &ProtocolError) -> Self {
        Self {
            success: false,
            code: Some("INVALID_MESSAGE"),
            error: Some(err.to_string()),
            ..Self::ok()
        }
    }
}

/// Reply frame: `{"event":"ack","ack":n,"data":{...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct AckFrame<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack: Option<u64>,
    data: &'a Reply,
}

impl<'a> AckFrame<'a> {
    /// Wraps a reply with its correlation id.
    pub fn new(ack: Option<u64>, data: &'a Reply) -> Self {
        Self {
            event: "ack",
            ack,
            data,
        }
    }
}
