//! Persistence for game results: player totals, leaderboard and history.
//!
//! This is the store behind [`crate::SqliteReporter`]; the match engine
//! itself never touches it.

mod error;
mod models;
mod repository;
mod schema;

pub use error::DbError;
pub use models::{GameOutcome, HistoryEntry, LeaderboardEntry, NewHistoryEntry, PlayerStats};
pub use repository::StatsRepository;
