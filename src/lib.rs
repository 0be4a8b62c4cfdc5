//! Strictly Arena - real-time matchmaking for online tic-tac-toe
//!
//! Players connect over a WebSocket, wait in a shared queue, get paired at
//! random and play under a server that validates every move, enforces a
//! per-turn timeout and keeps a persistent score ledger.
//!
//! # Architecture
//!
//! - **Games**: board evaluator (win lines, draws)
//! - **Matches**: per-match state machine and turn authority
//! - **Queue / Presence**: waiting pool, matchmaker and live sessions
//! - **Ledger / Db**: cumulative scores and the bounded leaderboard
//! - **Arena**: the single authority tying them together
//! - **Server**: axum WebSocket transport and the arena task
//!
//! # Example
//!
//! ```no_run
//! use strictly_arena::{ArenaConfig, LeaderboardCache, Ledger, MemoryScoreStore, serve, spawn_arena};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ArenaConfig::default().in_memory();
//! let ledger = Ledger::open(Box::new(MemoryScoreStore::new()), LeaderboardCache::disabled(), 10)?;
//! let (handle, _task) = spawn_arena(config.clone(), ledger);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! serve(listener, handle, &config).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod arena;
mod chat;
mod config;
mod db;
mod games;
mod ledger;
mod matches;
mod presence;
mod protocol;
mod queue;
mod server;
mod timer;

// Crate-level exports - Arena authority
pub use arena::{Arena, ConnectRejection, TurnResult};

// Crate-level exports - Configuration
pub use config::{ArenaConfig, ChatConfig, ConfigError};

// Crate-level exports - Scores
pub use db::{DbError, NewScore, ScoreRecord, ScoreRepository, StoreOp};
pub use ledger::{
    LeaderboardCache, LeaderboardEntry, Ledger, LedgerError, MemoryScoreStore, ScoreStore,
};

// Crate-level exports - Matches, queue and presence
pub use matches::{Match, MatchId, MatchPhase, MatchPlayer, MatchStore, MoveRejection};
pub use presence::{
    ConnectionId, Identity, Outbox, PlayerKey, Presence, PresenceStore, Session, SessionRegistry,
};
pub use queue::{Matchmaker, QueueEntry, QueueStore};

// Crate-level exports - Wire protocol
pub use protocol::{ChatLine, ClientEvent, MatchRef, MatchView, PlayerView, ServerEvent};

// Crate-level exports - Timers and chat
pub use chat::{ChatCommand, ChatFilter, ChatLimiter, WordListFilter};
pub use timer::{ManualTurnClock, TokioTurnClock, TurnClock, TurnExpiry};

// Crate-level exports - Transport
pub use server::{ArenaHandle, Command, HandshakeError, router, run_arena, serve, spawn_arena};

// Crate-level exports - Game types (tic-tac-toe)
pub use games::tictactoe::{
    Board, Mark, Outcome, Position, PositionOutOfRange, Square, check_winner, evaluate, is_full,
};
