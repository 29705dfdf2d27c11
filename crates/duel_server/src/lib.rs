//! Duel server - real-time two-player tic-tac-toe
//!
//! Players meet in short-lived rooms over a WebSocket, alternate moves on a
//! shared board, and play as many rounds as they like. Completed rounds are
//! persisted as game sessions; registered accounts accumulate statistics
//! served through a REST API.
//!
//! # Architecture
//!
//! - **Room**: in-memory registry of live rooms and their game state
//! - **Coordinator**: validates client intents and produces events
//! - **Gateway**: WebSocket transport, frame parsing and fan-out
//! - **Reconciler**: mirrors room lifecycle into persisted sessions
//! - **API**: REST endpoints for sessions, accounts and the leaderboard
//!
//! # Example
//!
//! ```no_run
//! use duel_server::{AppState, Credentials, GameRepository, build_router};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let repo = GameRepository::new("duel.db".to_string())?;
//! repo.run_migrations()?;
//! let credentials = Credentials::new("secret", 24)?;
//! let app = build_router(AppState::new(repo, credentials), &[]);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod api;
mod auth;
mod config;
mod coordinator;
mod db;
mod gateway;
mod protocol;
mod reconcile;
mod room;
mod server;
mod stats_service;
mod store;

// Crate-level exports - REST
pub use api::{ApiError, ApiResponse, AuthUser, FieldError};

// Crate-level exports - Credentials
pub use auth::{AuthError, Claims, Credentials, hash_password, verify_password};

// Crate-level exports - Configuration
pub use config::{ConfigError, ConfigOverrides, FileConfig, ServerConfig};

// Crate-level exports - Live play
pub use coordinator::{CoordinatorError, Envelope, MatchCoordinator, Outcome};
pub use gateway::{ConnectionHub, Gateway};
pub use protocol::{
    AckFrame, ChatMessage, ClientMessage, CreateRoom, Inbound, JoinExistingRoom, JoinRoom,
    MakeMove, MoveMade, PlayerLeft, ProtocolError, Reply, RoomRef, RoomSnapshot, SendMessage,
    ServerEvent, parse_frame,
};
pub use room::{
    ConnectionId, GameState, MoveApplied, Player, ReadyStatus, Rejoin, Room, RoomCode,
    RoomRegistry, SharedRoom,
};

// Crate-level exports - Persistence
pub use db::{
    CompletedRound, DbError, GameOutcome, GameRepository, MoveRecord, NewSession, NewUser,
    PublicProfile, RoundMove, RoundRecord, RoundSnapshot, RoundWinner, Seat, SessionCounters,
    SessionFilter, SessionRecord, SessionSnapshot, SessionType, User, UserChanges,
};
pub use reconcile::{SessionReconciler, SweepReport};
pub use store::{SessionStore, SqliteSessionStore};

// Crate-level exports - Server
pub use server::{AppState, build_router};
pub use stats_service::{
    HeadToHead, LeaderboardEntry, LeaderboardPage, LeaderboardQuery, OpponentInfo, Pagination,
    RecentGame, SessionResult, SortBy, SortOrder, StatsService, UserRank, UserStats,
};
