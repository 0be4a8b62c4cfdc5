//! SQLite persistence for cumulative player scores.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::{DbError, StoreOp};
pub use models::{NewScore, ScoreRecord};
pub use repository::ScoreRepository;
