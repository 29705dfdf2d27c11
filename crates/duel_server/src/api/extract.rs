//! Bearer-token authentication for REST handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use crate::api::ApiError;
use crate::db::User;
use crate::server::AppState;

/// The authenticated, active account making the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Reads the token from `Authorization`, with or without a `Bearer ` prefix.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let raw = parts.headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(ApiError::unauthorized("Access denied. No token provided."));
        };

        let user_id = state.credentials.verify_token(token).map_err(|e| {
            if e.is_expired() {
                ApiError::unauthorized("Token has expired.")
            } else {
                ApiError::unauthorized("Token is not valid.")
            }
        })?;

        match state.db(move |repo| repo.get_user(user_id)).await? {
            Some(user) if *user.is_active() => Ok(Self(user)),
            _ => {
                debug!(user_id, "Token for missing or inactive account");
                Err(ApiError::unauthorized("Token is not valid or user is inactive."))
            }
        }
    }
}
