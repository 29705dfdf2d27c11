//! Command-line interface for the duel server.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use duel_server::ConfigOverrides;

/// Duel - real-time two-player tic-tac-toe server
#[derive(Parser, Debug)]
#[command(name = "duel")]
#[command(about = "Real-time tic-tac-toe rooms with persisted sessions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true, env = "DUEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve(ServeArgs),

    /// Apply pending database migrations and exit
    Migrate,

    /// Delete every session with no completed rounds and exit
    Sweep,
}

/// Options for `serve`.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, env = "DUEL_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "DUEL_PORT")]
    pub port: Option<u16>,

    /// HS256 token secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Token lifetime in hours
    #[arg(long, env = "JWT_TTL_HOURS")]
    pub jwt_ttl_hours: Option<i64>,

    /// Seconds after which an idle room is evicted
    #[arg(long, env = "ROOM_TTL_SECS")]
    pub room_ttl_secs: Option<u64>,

    /// Seconds between idle sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Comma-separated allowed origins; empty allows any
    #[arg(long, env = "CORS_ORIGINS")]
    pub cors_origins: Option<String>,
}

impl Cli {
    /// Collects command-line and environment values for config resolution.
    pub fn overrides(&self) -> ConfigOverrides {
        let serve = match &self.command {
            Command::Serve(args) => Some(args),
            Command::Migrate | Command::Sweep => None,
        };
        ConfigOverrides {
            database_url: self.database_url.clone(),
            host: serve.and_then(|s| s.host.clone()),
            port: serve.and_then(|s| s.port),
            jwt_secret: serve.and_then(|s| s.jwt_secret.clone()),
            jwt_ttl_hours: serve.and_then(|s| s.jwt_ttl_hours),
            room_ttl_secs: serve.and_then(|s| s.room_ttl_secs),
            sweep_interval_secs: serve.and_then(|s| s.sweep_interval_secs),
            cors_origins: serve.and_then(|s| s.cors_origins.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_flags_become_overrides() {
        let cli = Cli::parse_from([
            "duel",
            "--database-url",
            "test.db",
            "serve",
            "--port",
            "7000",
            "--cors-origins",
            "http://a.example",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.database_url.as_deref(), Some("test.db"));
        assert_eq!(overrides.port, Some(7000));
        assert_eq!(overrides.cors_origins.as_deref(), Some("http://a.example"));
    }

    #[test]
    fn test_migrate_has_no_serve_overrides() {
        let cli = Cli::parse_from(["duel", "migrate"]);
        assert!(matches!(cli.command, Command::Migrate));
        assert_eq!(cli.overrides().port, None);
    }
}
