//! Command-line interface for strictly_arena.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Arena - matchmaking and turn authority for online tic-tac-toe
#[derive(Parser, Debug)]
#[command(name = "strictly_arena")]
#[command(about = "Real-time tic-tac-toe matchmaking server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the WebSocket game server
    Serve {
        /// Path to the TOML config file (defaults apply when missing)
        #[arg(short, long, default_value = "arena.toml")]
        config: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the score database
        #[arg(long)]
        db_path: Option<String>,

        /// Keep scores in memory only
        #[arg(long, conflicts_with = "db_path")]
        memory: bool,
    },

    /// Print the persisted leaderboard
    Leaderboard {
        /// Path to the TOML config file
        #[arg(short, long, default_value = "arena.toml")]
        config: PathBuf,

        /// Path to the score database
        #[arg(long)]
        db_path: Option<String>,
    },
}
