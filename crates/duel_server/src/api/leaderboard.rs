//! `/api/leaderboard`: rankings and per-account statistics.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::instrument;

use crate::api::validate::Checks;
use crate::api::{ApiError, ApiResponse, AuthUser, FieldError};
use crate::server::AppState;
use crate::stats_service::{
    LeaderboardPage, LeaderboardQuery, SortBy, SortOrder, UserRank, UserStats,
};

/// Raw leaderboard query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardParams {
    sort_by: Option<String>,
    order: Option<String>,
    page: Option<String>,
    limit: Option<String>,
    min_games: Option<String>,
}

impl LeaderboardParams {
    /// Validates every parameter, reporting all failures together.
    pub fn parse(&self) -> Result<LeaderboardQuery, ApiError> {
        let defaults = LeaderboardQuery::default();
        let mut checks = Checks::new();

        let sort_by = match self.sort_by.as_deref() {
            None => Some(defaults.sort_by),
            Some(raw) => checks.check(raw.parse::<SortBy>().map_err(|_| {
                FieldError::new("sortBy", "sortBy must be one of: wins, winRate, totalGames")
            })),
        };
        let order = match self.order.as_deref() {
            None => Some(defaults.order),
            Some(raw) => checks.check(
                raw.parse::<SortOrder>()
                    .map_err(|_| FieldError::new("order", "order must be either asc or desc")),
            ),
        };
        let page = match self.page.as_deref() {
            None => Some(defaults.page),
            Some(raw) => checks.check(
                raw.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| FieldError::new("page", "page must be a positive integer")),
            ),
        };
        let limit = match self.limit.as_deref() {
            None => Some(defaults.limit),
            Some(raw) => checks.check(
                raw.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|l| (1..=100).contains(l))
                    .ok_or_else(|| FieldError::new("limit", "limit must be between 1 and 100")),
            ),
        };
        let min_games = match self.min_games.as_deref() {
            None => Some(defaults.min_games),
            Some(raw) => checks.check(
                raw.trim()
                    .parse::<i32>()
                    .ok()
                    .filter(|m| *m >= 0)
                    .ok_or_else(|| {
                        FieldError::new("minGames", "minGames must be a non-negative integer")
                    }),
            ),
        };

        match (sort_by, order, page, limit, min_games) {
            (Some(sort_by), Some(order), Some(page), Some(limit), Some(min_games)) => {
                Ok(LeaderboardQuery {
                    sort_by,
                    order,
                    page,
                    limit,
                    min_games,
                })
            }
            _ => Err(ApiError::validation(checks.into_errors())),
        }
    }
}

/// `GET /api/leaderboard`
#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<ApiResponse<LeaderboardPage>>, ApiError> {
    let query = params.parse()?;
    let page = state.stats(move |stats| stats.leaderboard(query)).await?;
    Ok(Json(ApiResponse::ok(page)))
}

fn user_id(raw: &str) -> Result<i32, ApiError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid user ID format"))
}

async fn stats_for(
    state: &AppState,
    user_id: i32,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    state
        .stats(move |stats| stats.user_stats(user_id))
        .await?
        .map(|stats| Json(ApiResponse::ok(stats)))
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn rank_for(state: &AppState, user_id: i32) -> Result<Json<ApiResponse<UserRank>>, ApiError> {
    state
        .stats(move |stats| stats.user_rank(user_id))
        .await?
        .map(|rank| Json(ApiResponse::ok(rank)))
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// `GET /api/leaderboard/user/{id}/stats`
#[instrument(skip(state))]
pub async fn user_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    stats_for(&state, user_id(&id)?).await
}

/// `GET /api/leaderboard/user/{id}/rank`
#[instrument(skip(state))]
pub async fn user_rank(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserRank>>, ApiError> {
    rank_for(&state, user_id(&id)?).await
}

/// `GET /api/leaderboard/my/stats`
pub async fn my_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    stats_for(&state, *user.id()).await
}

/// `GET /api/leaderboard/my/rank`
pub async fn my_rank(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<UserRank>>, ApiError> {
    rank_for(&state, *user.id()).await
}
