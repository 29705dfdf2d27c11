//! Duel server binary.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use duel_server::{
    AppState, Credentials, FileConfig, GameRepository, ServerConfig, SessionReconciler,
    SqliteSessionStore, build_router,
};
use std::sync::Arc;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duel_server=debug")),
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let config = ServerConfig::resolve(file, cli.overrides())?;

    match cli.command {
        Command::Serve(_) => run_server(config).await,
        Command::Migrate => run_migrate(&config),
        Command::Sweep => run_sweep(config).await,
    }
}

fn open_repository(config: &ServerConfig) -> Result<GameRepository> {
    let repo = GameRepository::new(config.database_url().clone())?;
    repo.run_migrations()?;
    Ok(repo)
}

/// Apply pending migrations and exit
#[instrument(skip_all)]
fn run_migrate(config: &ServerConfig) -> Result<()> {
    open_repository(config)?;
    info!(database = %config.database_url(), "Database is up to date");
    Ok(())
}

/// Delete abandoned sessions and exit
#[instrument(skip_all)]
async fn run_sweep(config: ServerConfig) -> Result<()> {
    let repo = open_repository(&config)?;
    let reconciler = SessionReconciler::new(Arc::new(SqliteSessionStore::new(repo)));
    let deleted = reconciler.startup_sweep().await?;
    info!(deleted, "Sweep finished");
    Ok(())
}

/// Run the HTTP and WebSocket server
#[instrument(skip_all)]
async fn run_server(config: ServerConfig) -> Result<()> {
    info!(?config, "Starting duel server");

    let repo = open_repository(&config)?;
    let credentials = Credentials::new(config.jwt_secret(), *config.jwt_ttl_hours())?;
    let state = AppState::new(repo, credentials);

    state.reconciler.startup_sweep().await?;
    let sweeper = state.reconciler.spawn_sweeper(
        state.registry.clone(),
        *config.room_ttl(),
        *config.sweep_interval(),
    );

    let app = build_router(state, config.cors_origins());
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "Server ready");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested");
        })
        .await;
    sweeper.abort();
    result?;

    info!("Server stopped");
    Ok(())
}
