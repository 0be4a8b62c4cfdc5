//! Score store error types.

use derive_more::Error;
use tracing::instrument;

/// Score store call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StoreOp {
    /// Opening the database file.
    Connect,
    /// Applying embedded migrations.
    Migrate,
    /// Reading one player's score.
    Get,
    /// Writing one player's score.
    Set,
    /// Reading many scores (full or top-N scan).
    Scan,
}

/// Score store error with the failing operation, the player it concerned
/// and the caller location.
#[derive(Debug, Clone, Error)]
pub struct DbError {
    /// Operation that failed.
    pub op: StoreOp,
    /// Player key the operation was for, if any.
    pub username: Option<String>,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Creates an error for `op` with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(op: StoreOp, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            op,
            username: None,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Attaches the player key the failing operation was for.
    pub fn for_player(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Score store {} failed", self.op)?;
        if let Some(username) = &self.username {
            write!(f, " for '{}'", username)?;
        }
        write!(f, ": {} at {}:{}", self.message, self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_operation_and_player() {
        let err = DbError::new(StoreOp::Set, "disk full").for_player("alice");
        let text = err.to_string();
        assert!(text.starts_with("Score store set failed for 'alice': disk full at "));
        assert!(text.contains("error.rs"));
    }

    #[test]
    fn test_display_without_player() {
        let err = DbError::new(StoreOp::Scan, "locked");
        assert!(err.to_string().starts_with("Score store scan failed: locked at "));
    }
}
