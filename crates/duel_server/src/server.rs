//! HTTP application: shared state and the router.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::api;
use crate::auth::Credentials;
use crate::coordinator::MatchCoordinator;
use crate::db::{DbError, GameRepository};
use crate::gateway::{self, ConnectionHub, Gateway};
use crate::reconcile::SessionReconciler;
use crate::room::RoomRegistry;
use crate::stats_service::StatsService;
use crate::store::{SessionStore, SqliteSessionStore};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Account and session storage.
    pub repo: GameRepository,
    /// Token and password primitives.
    pub credentials: Credentials,
    /// Leaderboard queries.
    pub stats: StatsService,
    /// Live rooms.
    pub registry: Arc<RoomRegistry>,
    /// Session bookkeeping for live rooms.
    pub reconciler: SessionReconciler,
    /// WebSocket dispatch.
    pub gateway: Gateway,
}

impl AppState {
    /// Wires the live subsystem and REST services over one repository.
    #[instrument(skip_all)]
    pub fn new(repo: GameRepository, credentials: Credentials) -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(repo.clone()));
        let reconciler = SessionReconciler::new(store);
        let registry = Arc::new(RoomRegistry::new());
        let coordinator =
            MatchCoordinator::new(registry.clone(), reconciler.clone(), credentials.clone());
        let gateway = Gateway::new(coordinator, Arc::new(ConnectionHub::new()));
        info!("Application state ready");

        Self {
            stats: StatsService::new(repo.clone()),
            repo,
            credentials,
            registry,
            reconciler,
            gateway,
        }
    }

    /// Runs a repository call on the blocking pool.
    pub async fn db<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&GameRepository) -> Result<T, DbError> + Send + 'static,
    {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || op(&repo)).await?
    }

    /// Runs a stats query on the blocking pool.
    pub async fn stats<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&StatsService) -> Result<T, DbError> + Send + 'static,
    {
        let stats = self.stats.clone();
        tokio::task::spawn_blocking(move || op(&stats)).await?
    }
}

/// Builds the full router: health, WebSocket, REST API and a JSON 404.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(api::health))
        .route("/ws", get(gateway::ws_handler))
        .nest("/api", api::routes())
        .fallback(api::not_found)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
