//! Strictly Arena - unified CLI
//!
//! Runs the matchmaking server or inspects persisted scores.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::path::Path;
use strictly_arena::{
    ArenaConfig, LeaderboardCache, Ledger, MemoryScoreStore, ScoreRepository, ScoreStore,
    serve, spawn_arena,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strictly_arena=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            db_path,
            memory,
        } => run_server(&config, host, port, db_path, memory).await,
        Command::Leaderboard { config, db_path } => print_leaderboard(&config, db_path),
    }
}

/// Run the WebSocket game server
#[instrument(skip_all, fields(config = %config_path.display()))]
async fn run_server(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<String>,
    memory: bool,
) -> Result<()> {
    let mut config = ArenaConfig::load_or_default(config_path)?
        .with_bind(host, port)
        .with_db_path(db_path);
    if memory {
        warn!("Scores will not survive a restart");
        config = config.in_memory();
    }

    let ledger = open_ledger(&config)?;
    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port()))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host(), config.port()))?;
    info!(host = %config.host(), port = config.port(), "Server ready");

    let (handle, arena_task) = spawn_arena(config.clone(), ledger);
    serve(listener, handle, &config).await?;
    arena_task.abort();
    Ok(())
}

/// Print the persisted leaderboard
fn print_leaderboard(config_path: &Path, db_path: Option<String>) -> Result<()> {
    let config = ArenaConfig::load_or_default(config_path)?.with_db_path(db_path);
    let path = config
        .db_path()
        .clone()
        .context("No database configured")?;
    let repo = ScoreRepository::open(path)?;
    for (rank, entry) in repo.top(*config.leaderboard_size())?.iter().enumerate() {
        println!("{:>2}. {:<24} {}", rank + 1, entry.username, entry.score);
    }
    Ok(())
}

fn open_ledger(config: &ArenaConfig) -> Result<Ledger> {
    let store: Box<dyn ScoreStore> = match config.db_path() {
        Some(path) => Box::new(ScoreRepository::open(path.clone())?),
        None => Box::new(MemoryScoreStore::new()),
    };
    let cache = LeaderboardCache::new(config.leaderboard_path().clone());
    Ok(Ledger::open(store, cache, *config.leaderboard_size())?)
}
