//! Database repository for player scores.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::db::{DbError, NewScore, ScoreRecord, StoreOp, schema};
use crate::ledger::{LeaderboardEntry, ScoreStore};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite-backed score store.
#[derive(Debug, Clone)]
pub struct ScoreRepository {
    db_path: String,
}

impl ScoreRepository {
    /// Opens the database at `db_path`, creating the file and applying any
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, DbError> {
        info!(path = %db_path, "Opening score repository");
        let repo = Self { db_path };
        let mut conn = repo.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(StoreOp::Migrate, e.to_string()))?;
        info!(applied = applied.len(), "Migrations applied");
        Ok(repo)
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(StoreOp::Connect, format!("'{}': {}", self.db_path, e)))
    }

    /// Loads the full record of one player.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn record(&self, username: &str) -> Result<Option<ScoreRecord>, DbError> {
        let mut conn = self.connection()?;
        let record = schema::scores::table
            .find(username)
            .select(ScoreRecord::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| DbError::new(StoreOp::Get, e.to_string()).for_player(username))?;
        Ok(record)
    }
}

impl ScoreStore for ScoreRepository {
    #[instrument(skip(self))]
    fn get(&self, username: &str) -> Result<Option<i64>, DbError> {
        let mut conn = self.connection()?;
        let score = schema::scores::table
            .find(username)
            .select(schema::scores::score)
            .first::<i64>(&mut conn)
            .optional()
            .map_err(|e| DbError::new(StoreOp::Get, e.to_string()).for_player(username))?;
        debug!(?score, "Score loaded");
        Ok(score)
    }

    #[instrument(skip(self))]
    fn set(&mut self, username: &str, score: i64) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let now = chrono::Utc::now().naive_utc();
        let row = NewScore::new(username.to_string(), score, now);

        diesel::insert_into(schema::scores::table)
            .values(&row)
            .on_conflict(schema::scores::username)
            .do_update()
            .set((
                schema::scores::score.eq(score),
                schema::scores::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(|e| DbError::new(StoreOp::Set, e.to_string()).for_player(username))?;

        debug!("Score stored");
        Ok(())
    }

    #[instrument(skip(self))]
    fn all(&self) -> Result<Vec<LeaderboardEntry>, DbError> {
        let mut conn = self.connection()?;
        let rows = schema::scores::table
            .select((schema::scores::username, schema::scores::score))
            .load::<(String, i64)>(&mut conn)
            .map_err(|e| DbError::new(StoreOp::Scan, e.to_string()))?;
        info!(count = rows.len(), "Scores loaded");
        Ok(rows
            .into_iter()
            .map(|(username, score)| LeaderboardEntry::new(username, score))
            .collect())
    }

    #[instrument(skip(self))]
    fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, DbError> {
        let mut conn = self.connection()?;
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let rows = schema::scores::table
            .select((schema::scores::username, schema::scores::score))
            .order(schema::scores::score.desc())
            .limit(limit)
            .load::<(String, i64)>(&mut conn)
            .map_err(|e| DbError::new(StoreOp::Scan, e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(username, score)| LeaderboardEntry::new(username, score))
            .collect())
    }
}
