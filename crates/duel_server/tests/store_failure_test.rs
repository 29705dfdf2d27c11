//! Match play keeps going when session storage fails.

use std::sync::Arc;

use async_trait::async_trait;
use duel_server::{
    CompletedRound, ConnectionId, CreateRoom, Credentials, DbError, GameOutcome, GameRepository,
    JoinRoom, MakeMove, MatchCoordinator, NewSession, Outcome, RoomCode, RoomRegistry,
    ServerEvent, SessionFilter, SessionReconciler, SessionRecord, SessionSnapshot, SessionStore,
    SqliteSessionStore,
};
use duel_tictactoe::Symbol;
use tempfile::NamedTempFile;

/// Real store whose session create or fetch can be switched to fail.
#[derive(Debug)]
struct FlakyStore {
    inner: SqliteSessionStore,
    fail_create: bool,
    fail_find: bool,
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, DbError> {
        if self.fail_create {
            return Err(DbError::new("database is locked"));
        }
        self.inner.create_session(new_session).await
    }

    async fn find_session(&self, session_id: i32) -> Result<Option<SessionSnapshot>, DbError> {
        if self.fail_find {
            return Err(DbError::new("database is locked"));
        }
        self.inner.find_session(session_id).await
    }

    async fn record_round(
        &self,
        session_id: i32,
        round: CompletedRound,
    ) -> Result<SessionRecord, DbError> {
        self.inner.record_round(session_id, round).await
    }

    async fn delete_if_empty(&self, session_id: i32) -> Result<bool, DbError> {
        self.inner.delete_if_empty(session_id).await
    }

    async fn delete_all_empty(&self, keep: Vec<i32>) -> Result<usize, DbError> {
        self.inner.delete_all_empty(keep).await
    }

    async fn apply_account_result(
        &self,
        user_id: i32,
        outcome: GameOutcome,
    ) -> Result<(), DbError> {
        self.inner.apply_account_result(user_id, outcome).await
    }
}

struct Harness {
    _db: NamedTempFile,
    repo: GameRepository,
    registry: Arc<RoomRegistry>,
    coordinator: MatchCoordinator,
}

fn harness(fail_create: bool, fail_find: bool) -> Harness {
    let db = NamedTempFile::new().expect("Failed to create temp file");
    let repo = GameRepository::new(db.path().to_str().expect("Invalid path").to_string())
        .expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");

    let store = FlakyStore {
        inner: SqliteSessionStore::new(repo.clone()),
        fail_create,
        fail_find,
    };
    let registry = Arc::new(RoomRegistry::new());
    let credentials = Credentials::new("test-secret", 24).expect("Credentials failed");
    let coordinator = MatchCoordinator::new(
        registry.clone(),
        SessionReconciler::new(Arc::new(store)),
        credentials,
    );
    Harness {
        _db: db,
        repo,
        registry,
        coordinator,
    }
}

async fn open_match(h: &Harness, alice: ConnectionId, bob: ConnectionId) -> (RoomCode, Outcome) {
    let created = h
        .coordinator
        .create(
            alice,
            CreateRoom {
                player_name: "Alice".into(),
                auth_token: None,
            },
        )
        .await
        .expect("Create failed");
    let code = created
        .reply
        .and_then(|reply| reply.room_code)
        .expect("No room code");
    let joined = h
        .coordinator
        .join(
            bob,
            JoinRoom {
                room_code: code.as_str().into(),
                player_name: "Bob".into(),
                auth_token: None,
            },
        )
        .await
        .expect("Join should succeed without storage");
    (code, joined)
}

async fn linked_session(h: &Harness, code: &RoomCode) -> Option<i32> {
    let room = h.registry.get(code).expect("Room missing");
    let session_id = *room.lock().await.session_id();
    session_id
}

fn stored_sessions(h: &Harness) -> i64 {
    let (_, total) = h
        .repo
        .list_sessions(&SessionFilter::default(), 0, 10)
        .expect("Query failed");
    total
}

#[tokio::test]
async fn test_failed_create_leaves_room_unlinked() {
    let h = harness(true, false);
    let (alice, bob) = (ConnectionId::new(), ConnectionId::new());
    let (code, joined) = open_match(&h, alice, bob).await;

    let ServerEvent::GameReady(snapshot) = &joined.events[0].event else {
        panic!("expected game_ready");
    };
    assert!(snapshot.game_state.is_active);
    assert!(snapshot.game_session.is_none());
    assert_eq!(linked_session(&h, &code).await, None);
}

#[tokio::test]
async fn test_unlinked_room_plays_without_persisting() {
    let h = harness(true, false);
    let (alice, bob) = (ConnectionId::new(), ConnectionId::new());
    let (code, _) = open_match(&h, alice, bob).await;

    let mut last = Outcome::none();
    for (turn, position) in [0, 3, 1, 4, 2].into_iter().enumerate() {
        let conn = if turn % 2 == 0 { alice } else { bob };
        last = h
            .coordinator
            .make_move(
                conn,
                MakeMove {
                    room_code: code.as_str().into(),
                    position,
                },
            )
            .await
            .expect("Move rejected");
    }

    let ServerEvent::MoveMade(made) = &last.events[0].event else {
        panic!("expected move_made");
    };
    assert_eq!(made.game_state.winner, Some(Symbol::X));
    assert!(made.game_session.is_none());
    assert_eq!(stored_sessions(&h), 0);
}

#[tokio::test]
async fn test_failed_fetch_omits_snapshot() {
    let h = harness(false, true);
    let (alice, bob) = (ConnectionId::new(), ConnectionId::new());
    let (code, joined) = open_match(&h, alice, bob).await;

    let ServerEvent::GameReady(snapshot) = &joined.events[0].event else {
        panic!("expected game_ready");
    };
    assert!(snapshot.game_session.is_none());
    assert_eq!(joined.events[0].to, vec![alice, bob]);

    let session_id = linked_session(&h, &code).await.expect("Session should be linked");
    assert!(h.repo.get_session(session_id).expect("Query failed").is_some());
    assert_eq!(stored_sessions(&h), 1);
}
