//! Server configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Chat settings.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Longest accepted message, in characters.
    max_len: usize,
    /// Messages allowed per player per window.
    rate_points: u32,
    /// Rate-limit window in seconds.
    rate_window_secs: u64,
    /// Words masked by the profanity filter.
    banned_words: Vec<String>,
    /// Badge color for regular players.
    badge_color: String,
    /// Badge color for the admin.
    admin_badge_color: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_len: 99,
            rate_points: 4,
            rate_window_secs: 2,
            banned_words: Vec::new(),
            badge_color: "#000000".to_string(),
            admin_badge_color: "#54b382".to_string(),
        }
    }
}

impl ChatConfig {
    /// Rate-limit window as a duration.
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

/// Top-level server configuration.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Address to bind.
    host: String,
    /// Port to bind.
    port: u16,
    /// SQLite database file; `None` keeps scores in memory.
    db_path: Option<String>,
    /// Leaderboard cache file; `None` disables the cache.
    leaderboard_path: Option<PathBuf>,
    /// Leaderboard length.
    leaderboard_size: usize,
    /// Seconds a player has to move.
    turn_timeout_secs: u64,
    /// Handshake header carrying the username.
    username_header: String,
    /// Handshake header carrying the external user id.
    user_id_header: String,
    /// Username allowed to run chat commands.
    admin: Option<String>,
    /// Fixed RNG seed for pairing and first-mover draws.
    seed: Option<u64>,
    /// Chat settings.
    chat: ChatConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            db_path: Some("strictly_arena.db".to_string()),
            leaderboard_path: Some(PathBuf::from("leaderboard.json")),
            leaderboard_size: 10,
            turn_timeout_secs: 60,
            username_header: "x-replit-user-name".to_string(),
            user_id_header: "x-replit-user-id".to_string(),
            admin: None,
            seed: None,
            chat: ChatConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Loads configuration from TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, defaults otherwise.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            info!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.leaderboard_size == 0 {
            return Err(ConfigError::new("leaderboard_size must be at least 1".to_string()));
        }
        if self.turn_timeout_secs == 0 {
            return Err(ConfigError::new("turn_timeout_secs must be at least 1".to_string()));
        }
        if self.chat.rate_points == 0 {
            return Err(ConfigError::new("chat.rate_points must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Turn window as a duration.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// Overrides the bind address.
    pub fn with_bind(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Overrides the database location; `None` leaves it unchanged.
    pub fn with_db_path(mut self, db_path: Option<String>) -> Self {
        if db_path.is_some() {
            self.db_path = db_path;
        }
        self
    }

    /// Keeps scores in memory and disables the leaderboard cache.
    pub fn in_memory(mut self) -> Self {
        self.db_path = None;
        self.leaderboard_path = None;
        self
    }

    /// Sets the admin username.
    pub fn with_admin(mut self, admin: impl Into<String>) -> Self {
        self.admin = Some(admin.into());
        self
    }

    /// Fixes the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = ArenaConfig::from_toml("").expect("parse");
        assert_eq!(*config.port(), 8000);
        assert_eq!(*config.leaderboard_size(), 10);
        assert_eq!(config.turn_timeout(), Duration::from_secs(60));
        assert_eq!(*config.chat().rate_points(), 4);
        assert_eq!(*config.chat().max_len(), 99);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = ArenaConfig::from_toml(
            r#"
            port = 9100
            admin = "CatR3kd"
            turn_timeout_secs = 30

            [chat]
            banned_words = ["darn"]
            "#,
        )
        .expect("parse");
        assert_eq!(*config.port(), 9100);
        assert_eq!(config.admin().as_deref(), Some("CatR3kd"));
        assert_eq!(config.turn_timeout(), Duration::from_secs(30));
        assert_eq!(config.chat().banned_words(), &vec!["darn".to_string()]);
        assert_eq!(*config.chat().rate_points(), 4);
    }

    #[test]
    fn test_zero_leaderboard_rejected() {
        assert!(ArenaConfig::from_toml("leaderboard_size = 0").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config =
            ArenaConfig::load_or_default(Path::new("/nonexistent/arena.toml")).expect("default");
        assert_eq!(config.host(), "127.0.0.1");
    }
}
