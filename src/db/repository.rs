//! Stats store: per-player totals, leaderboard and game history.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::db::{
    DbError, GameOutcome, HistoryEntry, LeaderboardEntry, NewHistoryEntry, PlayerStats, schema,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database repository for game results.
#[derive(Debug, Clone)]
pub struct StatsRepository {
    db_path: String,
    history_limit: i64,
}

impl StatsRepository {
    /// Creates a repository for the database at the given path, keeping at
    /// most `history_limit` history entries per player.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String, history_limit: u32) -> Self {
        info!(path = %db_path, history_limit, "Creating StatsRepository");
        Self {
            db_path,
            history_limit: i64::from(history_limit.max(1)),
        }
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migrations failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Records one game for one player: updates their totals and appends a
    /// history entry, trimming history to the configured limit. Returns the
    /// updated totals.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs; nothing is written in
    /// that case.
    #[instrument(skip(self), fields(outcome = outcome.to_db_string()))]
    pub fn record_result(
        &self,
        player: &str,
        opponent: &str,
        outcome: GameOutcome,
        match_id: &str,
    ) -> Result<PlayerStats, DbError> {
        let mut conn = self.connection()?;
        let now = chrono::Utc::now().naive_utc();
        let history_limit = self.history_limit;

        conn.transaction::<_, DbError, _>(|conn| {
            let existing = schema::player_stats::table
                .find(player)
                .select(PlayerStats::as_select())
                .first(conn)
                .optional()?;

            let mut stats = existing.unwrap_or_else(|| PlayerStats::fresh(player.to_string(), now));
            stats.apply(outcome, now);

            diesel::replace_into(schema::player_stats::table)
                .values(&stats)
                .execute(conn)?;

            let entry = NewHistoryEntry::new(
                match_id.to_string(),
                player.to_string(),
                opponent.to_string(),
                outcome.to_db_string().to_string(),
                outcome == GameOutcome::Draw,
                now,
            );
            diesel::insert_into(schema::game_history::table)
                .values(&entry)
                .execute(conn)?;

            let keep: Vec<i32> = schema::game_history::table
                .filter(schema::game_history::player_id.eq(player))
                .order(schema::game_history::id.desc())
                .limit(history_limit)
                .select(schema::game_history::id)
                .load(conn)?;
            let trimmed = diesel::delete(
                schema::game_history::table
                    .filter(schema::game_history::player_id.eq(player))
                    .filter(schema::game_history::id.ne_all(keep)),
            )
            .execute(conn)?;
            if trimmed > 0 {
                debug!(player, trimmed, "Trimmed game history");
            }

            Ok(stats)
        })
    }

    /// Totals for a player. Returns `None` if they never finished a game.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_stats(&self, user_id: &str) -> Result<Option<PlayerStats>, DbError> {
        let mut conn = self.connection()?;
        let stats = schema::player_stats::table
            .find(user_id)
            .select(PlayerStats::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(stats)
    }

    /// Top players by score (wins minus losses), best first. Ties go to
    /// more wins, then user id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, DbError> {
        use schema::player_stats::dsl::{losses, player_stats, user_id, wins};

        let mut conn = self.connection()?;
        let rows = player_stats
            .order(((wins - losses).desc(), wins.desc(), user_id.asc()))
            .limit(i64::from(limit))
            .select(PlayerStats::as_select())
            .load(&mut conn)?;

        info!(count = rows.len(), "Leaderboard loaded");
        Ok(rows
            .into_iter()
            .zip(1u32..)
            .map(|(stats, rank)| LeaderboardEntry::new(rank, stats))
            .collect())
    }

    /// Totals for a player together with their leaderboard rank, using the
    /// same ordering as [`StatsRepository::leaderboard`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn standing(&self, player: &str) -> Result<Option<LeaderboardEntry>, DbError> {
        use schema::player_stats::dsl::{losses, player_stats, user_id, wins};

        let Some(stats) = self.get_stats(player)? else {
            return Ok(None);
        };
        let score = stats.score();
        let own_wins = *stats.wins();

        let mut conn = self.connection()?;
        let ahead: i64 = player_stats
            .filter(
                (wins - losses)
                    .gt(score)
                    .or((wins - losses).eq(score).and(wins.gt(own_wins)))
                    .or((wins - losses)
                        .eq(score)
                        .and(wins.eq(own_wins))
                        .and(user_id.lt(player))),
            )
            .count()
            .get_result(&mut conn)?;

        let rank = u32::try_from(ahead + 1).unwrap_or(u32::MAX);
        debug!(player, rank, "Standing loaded");
        Ok(Some(LeaderboardEntry::new(rank, stats)))
    }

    /// Game history for a player, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, DbError> {
        use schema::game_history::dsl::{game_history, id, played_at, player_id};

        let mut conn = self.connection()?;
        let entries = game_history
            .filter(player_id.eq(user_id))
            .order((played_at.desc(), id.desc()))
            .select(HistoryEntry::as_select())
            .load(&mut conn)?;

        debug!(user_id, count = entries.len(), "History loaded");
        Ok(entries)
    }
}
