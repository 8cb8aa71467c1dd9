//! Tests for the stats repository and the SQLite reporter.

use tempfile::NamedTempFile;

use tictactoe_arena::db::{GameOutcome, StatsRepository};
use tictactoe_arena::{OutcomeReport, ResultReporter, SqliteReporter};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready repository.
fn setup_test_db(history_limit: u32) -> (NamedTempFile, StatsRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let repo = StatsRepository::new(db_path, history_limit);
    repo.run_migrations().expect("Migrations failed");
    (db_file, repo)
}

#[test]
fn test_unknown_player_has_no_stats() {
    let (_db, repo) = setup_test_db(100);
    assert!(repo.get_stats("nobody").expect("Query failed").is_none());
    assert!(repo.history("nobody").expect("Query failed").is_empty());
    assert!(repo.leaderboard(10).expect("Query failed").is_empty());
}

#[test]
fn test_record_result_creates_and_updates_stats() {
    let (_db, repo) = setup_test_db(100);

    let first = repo
        .record_result("alice", "bob", GameOutcome::Win, "m1")
        .expect("Record failed");
    assert_eq!(*first.wins(), 1);
    assert_eq!(*first.total_games(), 1);
    assert_eq!(*first.win_streak(), 1);

    repo.record_result("alice", "bob", GameOutcome::Win, "m2")
        .expect("Record failed");
    repo.record_result("alice", "carol", GameOutcome::Draw, "m3")
        .expect("Record failed");

    let stats = repo
        .get_stats("alice")
        .expect("Query failed")
        .expect("Stats missing");
    assert_eq!(*stats.wins(), 2);
    assert_eq!(*stats.draws(), 1);
    assert_eq!(*stats.losses(), 0);
    assert_eq!(*stats.total_games(), 3);
    assert_eq!(*stats.win_streak(), 0);
    assert_eq!(*stats.best_win_streak(), 2);
}

#[test]
fn test_history_most_recent_first() {
    let (_db, repo) = setup_test_db(100);
    repo.record_result("alice", "bob", GameOutcome::Win, "m1")
        .expect("Record failed");
    repo.record_result("alice", "bob", GameOutcome::Loss, "m2")
        .expect("Record failed");

    let history = repo.history("alice").expect("Query failed");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].match_id(), "m2");
    assert_eq!(history[0].parse_outcome().expect("Bad outcome"), GameOutcome::Loss);
    assert_eq!(history[1].match_id(), "m1");
    assert_eq!(history[1].opponent_id(), "bob");
    assert!(!*history[1].is_draw());
}

#[test]
fn test_history_is_capped() {
    let (_db, repo) = setup_test_db(3);
    for i in 0..5 {
        repo.record_result("alice", "bob", GameOutcome::Draw, &format!("m{}", i))
            .expect("Record failed");
    }

    let history = repo.history("alice").expect("Query failed");
    let ids: Vec<&str> = history.iter().map(|h| h.match_id().as_str()).collect();
    assert_eq!(ids, vec!["m4", "m3", "m2"]);

    // Totals are not capped.
    let stats = repo.get_stats("alice").expect("Query failed").expect("Stats missing");
    assert_eq!(*stats.total_games(), 5);
}

#[test]
fn test_history_cap_is_per_player() {
    let (_db, repo) = setup_test_db(2);
    for i in 0..3 {
        repo.record_result("alice", "bob", GameOutcome::Win, &format!("a{}", i))
            .expect("Record failed");
        repo.record_result("bob", "alice", GameOutcome::Loss, &format!("a{}", i))
            .expect("Record failed");
    }
    assert_eq!(repo.history("alice").expect("Query failed").len(), 2);
    assert_eq!(repo.history("bob").expect("Query failed").len(), 2);
}

#[test]
fn test_leaderboard_ordered_by_score() {
    let (_db, repo) = setup_test_db(100);
    // carol: 2 wins, 0 losses -> 2
    // alice: 3 wins, 2 losses -> 1
    // bob:   1 win,  0 losses -> 1, fewer wins than alice
    for (player, outcome) in [
        ("carol", GameOutcome::Win),
        ("carol", GameOutcome::Win),
        ("alice", GameOutcome::Win),
        ("alice", GameOutcome::Win),
        ("alice", GameOutcome::Win),
        ("alice", GameOutcome::Loss),
        ("alice", GameOutcome::Loss),
        ("bob", GameOutcome::Win),
    ] {
        repo.record_result(player, "x", outcome, "m")
            .expect("Record failed");
    }

    let board = repo.leaderboard(10).expect("Query failed");
    let rows: Vec<(u32, &str, i32)> = board
        .iter()
        .map(|e| (*e.rank(), e.stats().user_id().as_str(), e.stats().score()))
        .collect();
    assert_eq!(rows, vec![(1, "carol", 2), (2, "alice", 1), (3, "bob", 1)]);

    assert_eq!(repo.leaderboard(1).expect("Query failed").len(), 1);
}

#[test]
fn test_sqlite_reporter_records_both_participants() {
    let (_db, repo) = setup_test_db(100);
    let reporter = SqliteReporter::new(repo);

    reporter
        .record_outcome(&OutcomeReport::win(
            "alice".into(),
            vec!["alice".into(), "bob".into()],
            "m1",
        ))
        .expect("Report failed");
    reporter
        .record_outcome(&OutcomeReport::draw(
            vec!["alice".into(), "bob".into()],
            "m2",
        ))
        .expect("Report failed");

    let repo = reporter.repository();
    let alice = repo.get_stats("alice").expect("Query failed").expect("Stats missing");
    let bob = repo.get_stats("bob").expect("Query failed").expect("Stats missing");
    assert_eq!((*alice.wins(), *alice.losses(), *alice.draws()), (1, 0, 1));
    assert_eq!((*bob.wins(), *bob.losses(), *bob.draws()), (0, 1, 1));

    let bob_history = repo.history("bob").expect("Query failed");
    assert_eq!(bob_history.len(), 2);
    assert!(bob_history.iter().all(|h| h.opponent_id() == "alice"));
}

#[test]
fn test_unreachable_database_reports_error() {
    let repo = StatsRepository::new("/nonexistent-dir/arena/stats.db".to_string(), 100);
    let reporter = SqliteReporter::new(repo);
    let result = reporter.record_outcome(&OutcomeReport::draw(
        vec!["alice".into(), "bob".into()],
        "m1",
    ));
    assert!(result.is_err());
}

#[test]
fn test_standing_matches_leaderboard_rank() {
    let (_db, repo) = setup_test_db(100);
    // carol 2-0, alice 3-2, bob 1-0, dave 1-0 (ties bob, loses on user id)
    for (player, outcome) in [
        ("carol", GameOutcome::Win),
        ("carol", GameOutcome::Win),
        ("alice", GameOutcome::Win),
        ("alice", GameOutcome::Win),
        ("alice", GameOutcome::Win),
        ("alice", GameOutcome::Loss),
        ("alice", GameOutcome::Loss),
        ("bob", GameOutcome::Win),
        ("dave", GameOutcome::Win),
    ] {
        repo.record_result(player, "x", outcome, "m")
            .expect("Record failed");
    }

    let ranks: Vec<(String, u32)> = ["alice", "bob", "carol", "dave"]
        .iter()
        .map(|user| {
            let standing = repo
                .standing(user)
                .expect("Query failed")
                .expect("Standing missing");
            (standing.stats().user_id().clone(), *standing.rank())
        })
        .collect();
    assert_eq!(
        ranks,
        vec![
            ("alice".to_string(), 2),
            ("bob".to_string(), 3),
            ("carol".to_string(), 1),
            ("dave".to_string(), 4),
        ]
    );

    let board = repo.leaderboard(10).expect("Query failed");
    for entry in &board {
        let standing = repo
            .standing(entry.stats().user_id())
            .expect("Query failed")
            .expect("Standing missing");
        assert_eq!(standing.rank(), entry.rank());
    }

    assert!(repo.standing("nobody").expect("Query failed").is_none());
}
