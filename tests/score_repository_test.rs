//! Tests for the SQLite score repository and a ledger on top of it.

use tempfile::NamedTempFile;

use strictly_arena::{LeaderboardCache, Ledger, ScoreRepository, ScoreStore, StoreOp};

/// Creates a temporary database file with migrations applied. The file
/// handle must stay in scope to keep the file alive.
fn setup_test_db() -> (NamedTempFile, ScoreRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = ScoreRepository::open(db_path).expect("Failed to open repository");
    (db_file, repo)
}

#[test]
fn test_unknown_player_has_no_score() {
    let (_db, repo) = setup_test_db();
    assert_eq!(repo.get("nobody").expect("Query failed"), None);
    assert!(repo.record("nobody").expect("Query failed").is_none());
}

#[test]
fn test_set_then_overwrite() {
    let (_db, mut repo) = setup_test_db();
    repo.set("alice", 3).expect("Insert failed");
    repo.set("alice", -2).expect("Update failed");

    assert_eq!(repo.get("alice").expect("Query failed"), Some(-2));
    let record = repo.record("alice").expect("Query failed").expect("Missing");
    assert_eq!(record.username(), "alice");
    assert_eq!(*record.score(), -2);
    assert_eq!(repo.all().expect("Query failed").len(), 1);
}

#[test]
fn test_top_is_descending_and_bounded() {
    let (_db, mut repo) = setup_test_db();
    for (name, score) in [("a", 1), ("b", 5), ("c", -3), ("d", 2)] {
        repo.set(name, score).expect("Insert failed");
    }

    let top = repo.top(3).expect("Query failed");
    let names: Vec<_> = top.iter().map(|e| e.username.as_str()).collect();
    assert_eq!(names, ["b", "d", "a"]);
}

#[test]
fn test_scores_survive_reopen() {
    let (db, mut repo) = setup_test_db();
    repo.set("alice", 7).expect("Insert failed");
    drop(repo);

    let path = db.path().to_str().expect("Invalid path").to_string();
    let reopened = ScoreRepository::open(path).expect("Reopen failed");
    assert_eq!(reopened.get("alice").expect("Query failed"), Some(7));
}

#[test]
fn test_ledger_rebuilds_board_from_database() {
    let (db, mut repo) = setup_test_db();
    repo.set("alice", 4).expect("Insert failed");
    repo.set("bob", 9).expect("Insert failed");

    let cache_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let cache = LeaderboardCache::new(Some(cache_dir.path().join("leaderboard.json")));
    let mut ledger = Ledger::open(Box::new(repo), cache, 10).expect("Open failed");
    assert_eq!(ledger.top_n()[0].username, "bob");

    assert_eq!(ledger.adjust("alice", 6).expect("Adjust failed"), 10);
    assert_eq!(ledger.top_n()[0].username, "alice");

    let path = db.path().to_str().expect("Invalid path").to_string();
    let repo = ScoreRepository::open(path).expect("Reopen failed");
    assert_eq!(repo.get("alice").expect("Query failed"), Some(10));
}

#[test]
fn test_unopenable_path_reports_connect_failure() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("missing").join("scores.db");
    let err = ScoreRepository::open(path.to_str().expect("Invalid path").to_string())
        .expect_err("Open should fail");
    assert_eq!(err.op, StoreOp::Connect);
    assert!(err.username.is_none());
    assert!(err.to_string().starts_with("Score store connect failed"));
}
