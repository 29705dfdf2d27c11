//! REST API.

mod accounts;
mod error;
mod extract;
mod games;
mod leaderboard;
mod validate;

use axum::Json;
use axum::Router;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post, put};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

pub use error::{ApiError, FieldError};
pub use extract::AuthUser;

use crate::server::AppState;

/// Success envelope: `{success: true, message?, data?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Data only.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Data with a message.
    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    /// Message only.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Routes mounted under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/games", get(games::list).post(games::create))
        .route("/games/{id}", get(games::get).put(games::update))
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/profile", get(accounts::profile).put(accounts::update_profile))
        .route("/auth/change-password", put(accounts::change_password))
        .route("/leaderboard", get(leaderboard::leaderboard))
        .route("/leaderboard/user/{id}/stats", get(leaderboard::user_stats))
        .route("/leaderboard/user/{id}/rank", get(leaderboard::user_rank))
        .route("/leaderboard/my/stats", get(leaderboard::my_stats))
        .route("/leaderboard/my/rank", get(leaderboard::my_rank))
}

/// Health check body.
#[derive(Debug, Serialize)]
pub struct Health {
    message: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
}

/// `GET /`
pub async fn health() -> Json<Health> {
    Json(Health {
        message: "Tic Tac Toe API Server",
        status: "running",
        timestamp: Utc::now(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found(method: Method, uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": format!("Route {} {} not found", method, uri.path()),
        })),
    )
}
