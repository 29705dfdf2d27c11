//! Leaderboard and per-account statistics.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::db::{DbError, GameRepository, PublicProfile, SessionRecord, SessionType, User};

const RECENT_GAMES: i64 = 10;

/// Leaderboard primary sort key.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum SortBy {
    /// Rounds won, then rounds played.
    #[default]
    #[serde(rename = "wins")]
    #[strum(serialize = "wins")]
    Wins,
    /// Win percentage, then rounds played, then wins.
    #[serde(rename = "winRate")]
    #[strum(serialize = "winRate")]
    WinRate,
    /// Rounds played.
    #[serde(rename = "totalGames")]
    #[strum(serialize = "totalGames")]
    TotalGames,
}

/// Direction of the primary sort key.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

/// A validated leaderboard request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardQuery {
    /// Primary key.
    pub sort_by: SortBy,
    /// Primary key direction.
    pub order: SortOrder,
    /// 1-based page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Only accounts with at least this many rounds.
    pub min_games: i32,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            sort_by: SortBy::Wins,
            order: SortOrder::Desc,
            page: 1,
            limit: 50,
            min_games: 0,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Account id.
    pub id: i32,
    /// Username.
    pub username: String,
    /// Rounds won.
    pub wins: i32,
    /// Rounds lost.
    pub losses: i32,
    /// Rounds drawn.
    pub draws: i32,
    /// Rounds played.
    pub total_games: i32,
    /// Win percentage, one decimal.
    pub win_rate: f64,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Bio.
    pub bio: String,
    /// Registration time.
    pub created_at: NaiveDateTime,
    /// Position in the full ordering, 1-based.
    pub rank: usize,
}

/// Leaderboard page metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Matching accounts.
    pub total: usize,
    /// Current page.
    pub page: u32,
    /// Page count.
    pub pages: usize,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_prev: bool,
}

/// A leaderboard page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    /// Rows on this page.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Page metadata.
    pub pagination: Pagination,
}

/// The other side of a session, from one account's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentInfo {
    /// Opponent account, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    /// Account username, or the guest display name.
    pub username: String,
    /// Avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Whether the opponent played as a guest.
    pub is_guest: bool,
}

/// Session-level result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionResult {
    /// More rounds won than lost.
    Win,
    /// More rounds lost than won.
    Loss,
    /// Even.
    Draw,
}

/// A recent session summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentGame {
    /// Session id.
    pub id: i32,
    /// Who was on the other side.
    pub opponent: OpponentInfo,
    /// Who won more rounds.
    pub result: SessionResult,
    /// Rounds completed.
    pub total_rounds: i32,
    /// Session start.
    pub created_at: NaiveDateTime,
    /// Last update.
    pub updated_at: NaiveDateTime,
}

/// Aggregate record against one account opponent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadToHead {
    /// The opponent.
    pub opponent: OpponentInfo,
    /// Rounds won against them.
    pub wins: i32,
    /// Rounds lost against them.
    pub losses: i32,
    /// Rounds drawn.
    pub draws: i32,
    /// Rounds played.
    pub total_games: i32,
    /// Win percentage.
    pub win_rate: f64,
}

/// Full statistics for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Public profile.
    pub user: PublicProfile,
    /// Ten most recently updated sessions.
    pub recent_games: Vec<RecentGame>,
    /// Per-opponent aggregates, most played first.
    pub head_to_head_stats: Vec<HeadToHead>,
}

/// An account's rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRank {
    /// 1 + accounts ranked above.
    pub rank: i64,
    /// Public profile.
    pub user: PublicProfile,
}

fn win_rate(wins: i32, total: i32) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64 * 100.0
    }
}

fn compare(a: &User, b: &User, sort_by: SortBy, order: SortOrder) -> Ordering {
    let directed = |ord: Ordering| match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    };
    match sort_by {
        SortBy::Wins => directed(a.wins().cmp(b.wins()))
            .then_with(|| b.total_games().cmp(a.total_games())),
        SortBy::TotalGames => directed(a.total_games().cmp(b.total_games())),
        SortBy::WinRate => directed(a.win_rate().total_cmp(&b.win_rate()))
            .then_with(|| b.total_games().cmp(a.total_games()))
            .then_with(|| b.wins().cmp(a.wins())),
    }
}

/// Statistics queries over the repository.
#[derive(Debug, Clone)]
pub struct StatsService {
    repository: GameRepository,
}

impl StatsService {
    /// Creates a service backed by the given repository.
    #[instrument(skip(repository))]
    pub fn new(repository: GameRepository) -> Self {
        info!("Creating StatsService");
        Self { repository }
    }

    /// Ranked, paginated leaderboard of active accounts.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn leaderboard(&self, query: LeaderboardQuery) -> Result<LeaderboardPage, DbError> {
        let mut users = self.repository.list_active_users(query.min_games)?;
        users.sort_by(|a, b| compare(a, b, query.sort_by, query.order));

        let total = users.len();
        let limit = query.limit.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * limit;

        let leaderboard = users
            .iter()
            .enumerate()
            .skip(skip)
            .take(limit)
            .map(|(index, user)| LeaderboardEntry {
                id: *user.id(),
                username: user.username().clone(),
                wins: *user.wins(),
                losses: *user.losses(),
                draws: *user.draws(),
                total_games: *user.total_games(),
                win_rate: (user.win_rate() * 10.0).round() / 10.0,
                avatar: user.avatar().clone(),
                bio: user.bio().clone(),
                created_at: *user.created_at(),
                rank: index + 1,
            })
            .collect();

        let pagination = Pagination {
            total,
            page: query.page.max(1),
            pages: total.div_ceil(limit),
            has_next: skip + limit < total,
            has_prev: skip > 0,
        };
        debug!(total, "Leaderboard computed");
        Ok(LeaderboardPage {
            leaderboard,
            pagination,
        })
    }

    /// Profile, recent sessions and head-to-head record. `None` if the account is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn user_stats(&self, user_id: i32) -> Result<Option<UserStats>, DbError> {
        let Some(user) = self.repository.get_user(user_id)? else {
            return Ok(None);
        };

        let sessions = self.repository.sessions_for_user(user_id, None)?;
        let opponent_ids: Vec<i32> = sessions
            .iter()
            .filter_map(|s| opponent_account(s, user_id))
            .collect();
        let opponents: HashMap<i32, User> = self
            .repository
            .get_users(&opponent_ids)?
            .into_iter()
            .map(|u| (*u.id(), u))
            .collect();

        let recent_games = sessions
            .iter()
            .take(RECENT_GAMES as usize)
            .map(|session| RecentGame {
                id: *session.id(),
                opponent: opponent_info(session, user_id, &opponents),
                result: session_result(session, user_id),
                total_rounds: *session.total_rounds(),
                created_at: *session.created_at(),
                updated_at: *session.updated_at(),
            })
            .collect();

        let head_to_head_stats = head_to_head(&sessions, user_id, &opponents);

        Ok(Some(UserStats {
            user: user.to_public_profile(),
            recent_games,
            head_to_head_stats,
        }))
    }

    /// Rank by wins, ties broken by rounds played. `None` if the account is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn user_rank(&self, user_id: i32) -> Result<Option<UserRank>, DbError> {
        let Some(user) = self.repository.get_user(user_id)? else {
            return Ok(None);
        };
        let above = self
            .repository
            .count_users_ranked_above(*user.wins(), *user.total_games())?;
        Ok(Some(UserRank {
            rank: above + 1,
            user: user.to_public_profile(),
        }))
    }
}

fn is_player1(session: &SessionRecord, user_id: i32) -> bool {
    *session.player1_id() == Some(user_id)
}

fn opponent_account(session: &SessionRecord, user_id: i32) -> Option<i32> {
    if is_player1(session, user_id) {
        *session.player2_id()
    } else {
        *session.player1_id()
    }
}

fn opponent_info(
    session: &SessionRecord,
    user_id: i32,
    opponents: &HashMap<i32, User>,
) -> OpponentInfo {
    let guest_name = if is_player1(session, user_id) {
        session.player2_name()
    } else {
        session.player1_name()
    };
    match opponent_account(session, user_id).and_then(|id| opponents.get(&id)) {
        Some(account) => OpponentInfo {
            id: Some(*account.id()),
            username: account.username().clone(),
            avatar: account.avatar().clone(),
            is_guest: false,
        },
        None => OpponentInfo {
            id: None,
            username: guest_name.clone(),
            avatar: None,
            is_guest: true,
        },
    }
}

fn own_and_opponent_wins(session: &SessionRecord, user_id: i32) -> (i32, i32) {
    if is_player1(session, user_id) {
        (*session.player1_wins(), *session.player2_wins())
    } else {
        (*session.player2_wins(), *session.player1_wins())
    }
}

fn session_result(session: &SessionRecord, user_id: i32) -> SessionResult {
    let (own, other) = own_and_opponent_wins(session, user_id);
    match own.cmp(&other) {
        Ordering::Greater => SessionResult::Win,
        Ordering::Less => SessionResult::Loss,
        Ordering::Equal => SessionResult::Draw,
    }
}

fn head_to_head(
    sessions: &[SessionRecord],
    user_id: i32,
    opponents: &HashMap<i32, User>,
) -> Vec<HeadToHead> {
    let mut totals: BTreeMap<i32, (i32, i32, i32, i32)> = BTreeMap::new();
    for session in sessions {
        let counted =
            session.session_type().parse::<SessionType>().ok() != Some(SessionType::Guest);
        let Some(opponent_id) = opponent_account(session, user_id).filter(|_| counted) else {
            continue;
        };
        let (own, other) = own_and_opponent_wins(session, user_id);
        let entry = totals.entry(opponent_id).or_default();
        entry.0 += own;
        entry.1 += other;
        entry.2 += *session.draws();
        entry.3 += *session.total_rounds();
    }

    let mut rows: Vec<HeadToHead> = totals
        .into_iter()
        .filter_map(|(opponent_id, (wins, losses, draws, total_games))| {
            let account = opponents.get(&opponent_id)?;
            Some(HeadToHead {
                opponent: OpponentInfo {
                    id: Some(opponent_id),
                    username: account.username().clone(),
                    avatar: account.avatar().clone(),
                    is_guest: false,
                },
                wins,
                losses,
                draws,
                total_games,
                win_rate: win_rate(wins, total_games),
            })
        })
        .collect();
    rows.sort_by(|a, b| b.total_games.cmp(&a.total_games));
    rows
}
