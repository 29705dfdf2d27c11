//! REST API tests driven through the full router.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use duel_server::{
    AppState, Credentials, GameOutcome, GameRepository, NewSession, NewUser, build_router,
    hash_password,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tower::ServiceExt;

struct TestApp {
    _db: NamedTempFile,
    repo: GameRepository,
    router: Router,
}

fn setup_app() -> TestApp {
    let db = NamedTempFile::new().expect("Failed to create temp file");
    let repo = GameRepository::new(db.path().to_str().expect("Invalid path").to_string())
        .expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    let credentials = Credentials::new("test-secret", 24).expect("Credentials failed");
    let router = build_router(AppState::new(repo.clone(), credentials), &[]);
    TestApp {
        _db: db,
        repo,
        router,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self.router.clone().oneshot(request).await.expect("Request failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Body is not JSON")
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body), None).await
    }

    async fn register(&self, username: &str) -> (i64, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "Secret123",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let id = body["data"]["user"]["id"].as_i64().expect("No user id");
        let token = body["data"]["token"].as_str().expect("No token").to_string();
        (id, token)
    }
}

#[tokio::test]
async fn test_health_and_fallback() {
    let app = setup_app();
    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["message"], "Tic Tac Toe API Server");

    let (status, body) = app.get("/api/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Route GET /api/nowhere not found");
}

#[tokio::test]
async fn test_create_and_fetch_game() {
    let app = setup_app();
    let (status, created) = app
        .post(
            "/api/games",
            json!({
                "player1Name": " Alice ",
                "player2Name": "Bob",
                "player1Wins": 2,
                "totalRounds": 2
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["player1Name"], "Alice");
    assert_eq!(created["player1Wins"], 2);
    assert_eq!(created["draws"], 0);
    assert_eq!(created["sessionType"], "guest");

    let id = created["id"].as_i64().expect("No id");
    let (status, fetched) = app.get(&format!("/api/games/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["player2Name"], "Bob");
    assert_eq!(fetched["gameHistory"], json!([]));
}

#[tokio::test]
async fn test_create_game_validation() {
    let app = setup_app();
    let (status, body) = app
        .post("/api/games", json!({ "player1Name": "Sam", "player2Name": "sam", "draws": -1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation failed");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .expect("No errors")
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"draws"));
    assert_eq!(fields.len(), 2);

    let (status, body) = app.post("/api/games", json!({ "player2Name": "Bob" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "player1Name");
}

#[tokio::test]
async fn test_get_game_errors() {
    let app = setup_app();
    let (status, body) = app.get("/api/games/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid game session ID");

    let (status, body) = app.get("/api/games/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Game session not found");
}

#[tokio::test]
async fn test_list_games_paging() {
    let app = setup_app();
    for i in 0..12 {
        app.repo
            .create_session(NewSession::for_players(format!("P{}", i), "Q".into(), None, None))
            .expect("Create failed");
    }

    let (status, body) = app.get("/api/games?page=2&limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 12);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(5));
    assert_eq!(body["pagination"]["totalPages"], 3);
    assert_eq!(body["pagination"]["nextPage"], 3);
    assert_eq!(body["pagination"]["prevPage"], 1);

    let (_, body) = app.get("/api/games?limit=zero&sessionType=bogus").await;
    assert_eq!(body["pagination"]["limit"], 10);
    assert_eq!(body["total"], 12);

    let (_, body) = app.get("/api/games?sessionType=authenticated").await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_update_game_counters() {
    let app = setup_app();
    let session = app
        .repo
        .create_session(NewSession::for_players("A".into(), "B".into(), None, None))
        .expect("Create failed");
    let uri = format!("/api/games/{}", session.id());

    let changes = json!({ "draws": 3, "player1Wins": -5, "colour": "red" });
    let (status, body) = app.call(Method::PUT, &uri, Some(changes), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draws"], 3);
    assert_eq!(body["player1Wins"], 0);

    let (status, body) = app.call(Method::PUT, &uri, Some(json!({ "colour": "red" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No valid updates provided");

    let (status, _) = app
        .call(Method::PUT, "/api/games/4242", Some(json!({ "draws": 1 })), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_and_login() {
    let app = setup_app();
    let (_, token) = app.register("alice").await;
    assert!(!token.is_empty());

    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({ "username": "alice2", "email": "ALICE@example.com", "password": "Secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User with this email already exists");

    let (status, body) = app
        .post("/api/auth/login", json!({ "login": "alice@example.com", "password": "Secret123" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (status, body) = app
        .post("/api/auth/login", json!({ "login": "alice", "password": "Wrong123" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_register_validation_reports_all_fields() {
    let app = setup_app();
    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({ "username": "a!", "email": "nope", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(3));

    let (status, body) = app
        .call(Method::POST, "/api/auth/register", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_profile_requires_valid_token() {
    let app = setup_app();
    let (status, body) = app.get("/api/auth/profile").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Access denied. No token provided.");

    let (status, body) = app.call(Method::GET, "/api/auth/profile", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is not valid.");

    let (_, token) = app.register("bob").await;
    let (status, body) = app.call(Method::GET, "/api/auth/profile", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["username"], "bob");
}

#[tokio::test]
async fn test_update_profile_and_conflicts() {
    let app = setup_app();
    app.register("carol").await;
    let (_, token) = app.register("dave").await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/auth/profile",
            Some(json!({ "bio": "Corner player", "avatar": "https://cdn.example/d.png" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Profile updated successfully");
    assert_eq!(body["data"]["user"]["bio"], "Corner player");

    let (status, body) = app
        .call(Method::PUT, "/api/auth/profile", Some(json!({ "username": "carol" })), Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username is already taken");

    let (status, _) = app
        .call(Method::PUT, "/api/auth/profile", Some(json!({ "avatar": "ftp://x" })), Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password() {
    let app = setup_app();
    let (_, token) = app.register("erin").await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/auth/change-password",
            Some(json!({ "currentPassword": "Nope1234", "newPassword": "Better456" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Current password is incorrect");

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/auth/change-password",
            Some(json!({ "currentPassword": "Secret123", "newPassword": "Better456" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password changed successfully");

    let (status, _) = app
        .post("/api/auth/login", json!({ "login": "erin", "password": "Better456" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_leaderboard_ordering_and_validation() {
    let app = setup_app();
    let (first, _) = app.register("first").await;
    let (second, _) = app.register("second").await;
    app.register("idle").await;
    for _ in 0..3 {
        app.repo.apply_account_result(first as i32, GameOutcome::Win).expect("Apply failed");
    }
    app.repo.apply_account_result(second as i32, GameOutcome::Win).expect("Apply failed");
    app.repo.apply_account_result(second as i32, GameOutcome::Loss).expect("Apply failed");

    let (status, body) = app.get("/api/leaderboard?minGames=1").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"]["leaderboard"].as_array().expect("No rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["username"], "first");
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[1]["winRate"], 50.0);
    assert_eq!(body["data"]["pagination"]["total"], 2);

    let (_, body) = app.get("/api/leaderboard?sortBy=totalGames&order=asc").await;
    assert_eq!(body["data"]["leaderboard"][0]["username"], "idle");

    let (status, body) = app.get("/api/leaderboard?sortBy=luck&limit=500").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_user_stats_and_rank() {
    let app = setup_app();
    let (winner, token) = app.register("winner").await;
    let hash = hash_password("Secret123").expect("Hash failed");
    let rival = app
        .repo
        .create_user(NewUser::new("rival".into(), "rival@example.com".into(), hash))
        .expect("Create failed");
    app.repo
        .create_session(
            NewSession::for_players(
                "winner".into(),
                "rival".into(),
                Some(winner as i32),
                Some(*rival.id()),
            )
            .with_counters(2, 1, 0, 3),
        )
        .expect("Create failed");
    app.repo.apply_account_result(winner as i32, GameOutcome::Win).expect("Apply failed");

    let (status, body) = app.get(&format!("/api/leaderboard/user/{}/stats", winner)).await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["recentGames"][0]["result"], "win");
    assert_eq!(stats["recentGames"][0]["opponent"]["username"], "rival");
    assert_eq!(stats["headToHeadStats"][0]["wins"], 2);
    assert_eq!(stats["headToHeadStats"][0]["losses"], 1);

    let (_, body) = app.get(&format!("/api/leaderboard/user/{}/rank", rival.id())).await;
    assert_eq!(body["data"]["rank"], 2);

    let (status, body) = app
        .call(Method::GET, "/api/leaderboard/my/rank", None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rank"], 1);

    let (status, body) = app.get("/api/leaderboard/user/x/stats").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid user ID format");

    let (status, body) = app.get("/api/leaderboard/user/999/rank").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    let (status, _) = app.get("/api/leaderboard/my/stats").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
