//! Database models and domain types.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;

use crate::db::{DbError, schema};

/// Running totals for one player.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, Getters)]
#[diesel(table_name = schema::player_stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlayerStats {
    user_id: String,
    wins: i32,
    losses: i32,
    draws: i32,
    win_streak: i32,
    best_win_streak: i32,
    total_games: i32,
    last_game_time: NaiveDateTime,
}

impl PlayerStats {
    /// A player with no games yet.
    pub fn fresh(user_id: String, now: NaiveDateTime) -> Self {
        Self {
            user_id,
            wins: 0,
            losses: 0,
            draws: 0,
            win_streak: 0,
            best_win_streak: 0,
            total_games: 0,
            last_game_time: now,
        }
    }

    /// Folds one game into the totals. Draws and losses reset the streak.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub fn apply(&mut self, outcome: GameOutcome, now: NaiveDateTime) {
        self.total_games += 1;
        self.last_game_time = now;
        match outcome {
            GameOutcome::Win => {
                self.wins += 1;
                self.win_streak += 1;
                self.best_win_streak = self.best_win_streak.max(self.win_streak);
            }
            GameOutcome::Loss => {
                self.losses += 1;
                self.win_streak = 0;
            }
            GameOutcome::Draw => {
                self.draws += 1;
                self.win_streak = 0;
            }
        }
    }

    /// Leaderboard score: wins minus losses.
    pub fn score(&self) -> i32 {
        self.wins - self.losses
    }
}

/// One stored game from a player's point of view.
#[derive(Debug, Clone, Queryable, Selectable, Getters)]
#[diesel(table_name = schema::game_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryEntry {
    id: i32,
    match_id: String,
    player_id: String,
    opponent_id: String,
    result: String,
    is_draw: bool,
    played_at: NaiveDateTime,
}

impl HistoryEntry {
    /// Parses the stored result string into a [`GameOutcome`].
    #[instrument(skip(self), fields(result = %self.result))]
    pub fn parse_outcome(&self) -> Result<GameOutcome, DbError> {
        GameOutcome::from_db_string(self.result())
    }
}

/// Insertable history row.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::game_history)]
pub struct NewHistoryEntry {
    match_id: String,
    player_id: String,
    opponent_id: String,
    result: String,
    is_draw: bool,
    played_at: NaiveDateTime,
}

/// Game outcome from the player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameOutcome {
    /// Player won the game.
    Win,
    /// Player lost the game.
    Loss,
    /// Game ended in a draw.
    Draw,
}

impl GameOutcome {
    /// Converts outcome to the string stored in the database.
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Draw => "draw",
        }
    }

    /// Parses outcome from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid outcome value.
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        match s {
            "win" => Ok(Self::Win),
            "loss" => Ok(Self::Loss),
            "draw" => Ok(Self::Draw),
            _ => Err(DbError::new(format!("Invalid outcome: '{}'", s))),
        }
    }
}

/// A ranked leaderboard row.
#[derive(Debug, Clone, Getters)]
pub struct LeaderboardEntry {
    rank: u32,
    stats: PlayerStats,
}

impl LeaderboardEntry {
    /// Creates a ranked row.
    pub fn new(rank: u32, stats: PlayerStats) -> Self {
        Self { rank, stats }
    }
}
