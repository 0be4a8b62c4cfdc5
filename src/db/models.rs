//! Database models for score records.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;

use crate::db::schema;

/// Stored score of one player.
#[derive(Debug, Clone, Queryable, Selectable, Getters)]
#[diesel(table_name = schema::scores)]
pub struct ScoreRecord {
    username: String,
    score: i64,
    updated_at: NaiveDateTime,
}

/// Insertable score row.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::scores)]
pub struct NewScore {
    username: String,
    score: i64,
    updated_at: NaiveDateTime,
}
