//! Cumulative scores and the bounded leaderboard derived from them.

use crate::db::DbError;
use derive_more::{Display, Error, From};
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct LeaderboardEntry {
    /// Player key.
    pub username: String,
    /// Cumulative score.
    pub score: i64,
}

/// Persistent player-key to score mapping.
pub trait ScoreStore: Send {
    /// Returns the stored score, or `None` for an unknown player.
    fn get(&self, username: &str) -> Result<Option<i64>, DbError>;

    /// Stores an absolute score.
    fn set(&mut self, username: &str, score: i64) -> Result<(), DbError>;

    /// Returns every stored score.
    fn all(&self) -> Result<Vec<LeaderboardEntry>, DbError>;

    /// Returns the `n` highest scores, descending.
    fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, DbError> {
        let mut entries = self.all()?;
        rank(&mut entries, n);
        Ok(entries)
    }
}

/// Volatile score store for tests and throwaway servers.
#[derive(Debug, Default, Clone)]
pub struct MemoryScoreStore {
    scores: HashMap<String, i64>,
}

impl MemoryScoreStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn get(&self, username: &str) -> Result<Option<i64>, DbError> {
        Ok(self.scores.get(username).copied())
    }

    fn set(&mut self, username: &str, score: i64) -> Result<(), DbError> {
        self.scores.insert(username.to_string(), score);
        Ok(())
    }

    fn all(&self) -> Result<Vec<LeaderboardEntry>, DbError> {
        Ok(self
            .scores
            .iter()
            .map(|(username, score)| LeaderboardEntry::new(username.clone(), *score))
            .collect())
    }
}

/// Sorts descending by score and keeps the first `n`.
fn rank(entries: &mut Vec<LeaderboardEntry>, n: usize) {
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries.truncate(n);
}

/// Ledger failure; the in-memory leaderboard is unchanged when returned.
#[derive(Debug, Clone, Display, Error, From)]
pub enum LedgerError {
    /// The score store rejected a read or write.
    #[display("Score store unavailable: {}", _0)]
    Store(DbError),
}

/// JSON side file holding the last computed leaderboard.
#[derive(Debug, Clone, Default, new)]
pub struct LeaderboardCache {
    path: Option<PathBuf>,
}

impl LeaderboardCache {
    /// A cache that never touches the filesystem.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Reads the cached leaderboard; missing or unreadable files read as
    /// empty.
    #[instrument(skip(self))]
    pub fn load(&self) -> Vec<LeaderboardEntry> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No leaderboard cache");
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt leaderboard cache, ignoring");
                Vec::new()
            }
        }
    }

    /// Writes the leaderboard. Failures are logged and otherwise ignored.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn save(&self, entries: &[LeaderboardEntry]) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string(entries)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write leaderboard cache");
        }
    }
}

/// Score store plus the cached top-N view over it.
pub struct Ledger {
    store: Box<dyn ScoreStore>,
    cache: LeaderboardCache,
    board: Vec<LeaderboardEntry>,
    capacity: usize,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("cache", &self.cache)
            .field("board", &self.board)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Opens the ledger, taking the leaderboard from the cache file or, when
    /// that is absent or empty, from a full scan of the store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the fallback scan fails.
    #[instrument(skip(store, cache))]
    pub fn open(
        store: Box<dyn ScoreStore>,
        cache: LeaderboardCache,
        capacity: usize,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            store,
            cache,
            board: Vec::new(),
            capacity,
        };

        let mut cached = ledger.cache.load();
        if cached.is_empty() {
            info!("Leaderboard cache empty, rebuilding from store");
            ledger.board = ledger.store.top(capacity)?;
            ledger.cache.save(&ledger.board);
        } else {
            rank(&mut cached, capacity);
            ledger.board = cached;
        }
        info!(entries = ledger.board.len(), "Ledger ready");
        Ok(ledger)
    }

    /// Maximum leaderboard length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current bounded ranking, descending by score.
    pub fn top_n(&self) -> &[LeaderboardEntry] {
        &self.board
    }

    /// Stored score of a player; unknown players score 0.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be read.
    pub fn score(&self, username: &str) -> Result<i64, LedgerError> {
        Ok(self.store.get(username)?.unwrap_or(0))
    }

    /// Initialises a first-time player at 0. Returns true if a record was
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be read or written.
    #[instrument(skip(self))]
    pub fn create_if_absent(&mut self, username: &str) -> Result<bool, LedgerError> {
        if self.store.get(username)?.is_some() {
            return Ok(false);
        }
        self.store.set(username, 0)?;
        self.patch(username, None, 0)?;
        info!("Score record created");
        Ok(true)
    }

    /// Applies a signed delta, zero-initialising unknown players, and
    /// returns the new score.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be read or written. The
    /// leaderboard is left as it was.
    #[instrument(skip(self))]
    pub fn adjust(&mut self, username: &str, delta: i64) -> Result<i64, LedgerError> {
        let old = self.store.get(username)?;
        let new = old.unwrap_or(0).saturating_add(delta);
        self.store.set(username, new)?;
        self.patch(username, old, new)?;
        info!(old = old.unwrap_or(0), new, "Score adjusted");
        Ok(new)
    }

    /// Recomputes the leaderboard after `username` moved to `new`.
    ///
    /// Insert-sort-truncate is exact unless a ranked player dropped on a
    /// full board: an unranked player may now outrank them, so that case
    /// rescans the store.
    fn patch(&mut self, username: &str, old: Option<i64>, new: i64) -> Result<(), LedgerError> {
        let ranked = self.board.iter().position(|e| e.username == username);
        let full = self.board.len() >= self.capacity;
        let dropped = old.is_some_and(|old| new < old);

        let next = if ranked.is_some() && full && dropped {
            debug!("Ranked player dropped on a full board, rescanning");
            self.store.top(self.capacity)?
        } else {
            let mut next: Vec<_> = self
                .board
                .iter()
                .filter(|e| e.username != username)
                .cloned()
                .collect();
            next.push(LeaderboardEntry::new(username.to_string(), new));
            rank(&mut next, self.capacity);
            next
        };

        self.cache.save(&next);
        self.board = next;
        Ok(())
    }
}
