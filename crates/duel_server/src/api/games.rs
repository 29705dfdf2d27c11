//! `/api/games`: session listing and manual session management.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::ApiError;
use crate::api::validate::{self, Checks};
use crate::db::{
    NewSession, SessionCounters, SessionFilter, SessionRecord, SessionSnapshot, SessionType,
};
use crate::server::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 50;

/// Query string for the listing. Values are parsed leniently.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    page: Option<String>,
    limit: Option<String>,
    session_type: Option<String>,
    is_active: Option<String>,
}

impl ListQuery {
    fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }

    fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l != 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    fn filter(&self) -> SessionFilter {
        SessionFilter {
            session_type: self
                .session_type
                .as_deref()
                .and_then(|t| t.parse::<SessionType>().ok()),
            is_active: self.is_active.as_deref().map(|a| a == "true"),
        }
    }
}

/// Listing page metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    page: i64,
    limit: i64,
    total: i64,
    total_pages: i64,
    has_next: bool,
    has_prev: bool,
    next_page: Option<i64>,
    prev_page: Option<i64>,
}

/// Listing response.
#[derive(Debug, Serialize)]
pub struct SessionPage {
    data: Vec<SessionRecord>,
    total: i64,
    pagination: PageInfo,
}

/// `GET /api/games`
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SessionPage>, ApiError> {
    let page = query.page();
    let limit = query.limit();
    let filter = query.filter();
    let (data, total) = state
        .db(move |repo| repo.list_sessions(&filter, (page - 1) * limit, limit))
        .await?;

    let total_pages = (total + limit - 1) / limit;
    let has_next = page < total_pages;
    let has_prev = page > 1;
    Ok(Json(SessionPage {
        data,
        total,
        pagination: PageInfo {
            page,
            limit,
            total,
            total_pages,
            has_next,
            has_prev,
            next_page: has_next.then_some(page + 1),
            prev_page: has_prev.then_some(page - 1),
        },
    }))
}

/// Body of `POST /api/games`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameBody {
    player1_name: Option<String>,
    player2_name: Option<String>,
    player1_wins: Option<i64>,
    player2_wins: Option<i64>,
    draws: Option<i64>,
    total_rounds: Option<i64>,
}

/// `POST /api/games`
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateGameBody>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionRecord>), ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::new();
    let player1 = checks.check(validate::player_name(
        "player1Name",
        "Player 1",
        body.player1_name.as_deref(),
    ));
    let player2 = checks.check(validate::player_name(
        "player2Name",
        "Player 2",
        body.player2_name.as_deref(),
    ));
    if let (Some(first), Some(second)) = (&player1, &player2) {
        checks.check(validate::distinct_names(first, second));
    }
    let player1_wins =
        checks.check(validate::counter("player1Wins", "Player 1 wins", body.player1_wins));
    let player2_wins =
        checks.check(validate::counter("player2Wins", "Player 2 wins", body.player2_wins));
    let draws = checks.check(validate::counter("draws", "Draws", body.draws));
    let total_rounds =
        checks.check(validate::counter("totalRounds", "Total rounds", body.total_rounds));

    let (Some(player1), Some(player2), Some(p1), Some(p2), Some(draws), Some(rounds)) =
        (player1, player2, player1_wins, player2_wins, draws, total_rounds)
    else {
        return Err(ApiError::validation(checks.into_errors()));
    };
    let errors = checks.into_errors();
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let new_session = NewSession::for_players(player1, player2, None, None)
        .with_counters(p1, p2, draws, rounds);
    let session = state.db(move |repo| repo.create_session(new_session)).await?;
    info!(session_id = session.id(), "Session created over REST");
    Ok((StatusCode::CREATED, Json(session)))
}

fn session_id(raw: &str) -> Result<i32, ApiError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid game session ID"))
}

/// `GET /api/games/{id}`
#[instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let id = session_id(&id)?;
    state
        .db(move |repo| repo.get_session_snapshot(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Game session not found"))
}

/// Body of `PUT /api/games/{id}`. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGameBody {
    player1_wins: Option<i64>,
    player2_wins: Option<i64>,
    draws: Option<i64>,
    total_rounds: Option<i64>,
}

impl UpdateGameBody {
    fn counters(&self) -> SessionCounters {
        SessionCounters {
            player1_wins: self.player1_wins.map(validate::clamp_counter),
            player2_wins: self.player2_wins.map(validate::clamp_counter),
            draws: self.draws.map(validate::clamp_counter),
            total_rounds: self.total_rounds.map(validate::clamp_counter),
        }
    }
}

/// `PUT /api/games/{id}`
#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateGameBody>, JsonRejection>,
) -> Result<Json<SessionRecord>, ApiError> {
    let id = session_id(&id)?;
    let Json(body) = payload?;
    let counters = body.counters();
    if counters.is_empty() {
        return Err(ApiError::bad_request("No valid updates provided"));
    }

    state
        .db(move |repo| repo.update_counters(id, counters))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Game session not found"))
}
