//! Result reporting collaborator.
//!
//! The lifecycle controller calls [`ResultReporter::record_outcome`] at most
//! once per round and only logs failures. Idempotency and retries belong to
//! the reporter. [`QueuedReporter`] moves the actual write off the calling
//! task.

use crate::db::{DbError, GameOutcome, StatsRepository};
use crate::presence::UserId;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, instrument, warn};

/// Terminal outcome of one round.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Winning user, `None` for a draw.
    winner: Option<UserId>,
    /// Both participants, X first.
    participants: Vec<UserId>,
    /// True when nobody won.
    is_draw: bool,
    /// Match the round was played in.
    match_id: String,
}

impl OutcomeReport {
    /// A round won by `winner`.
    pub fn win(winner: UserId, participants: Vec<UserId>, match_id: impl Into<String>) -> Self {
        Self {
            winner: Some(winner),
            participants,
            is_draw: false,
            match_id: match_id.into(),
        }
    }

    /// A drawn round.
    pub fn draw(participants: Vec<UserId>, match_id: impl Into<String>) -> Self {
        Self {
            winner: None,
            participants,
            is_draw: true,
            match_id: match_id.into(),
        }
    }

    /// The outcome from one participant's point of view.
    pub fn outcome_for(&self, user_id: &str) -> GameOutcome {
        if self.is_draw {
            GameOutcome::Draw
        } else if self.winner.as_deref() == Some(user_id) {
            GameOutcome::Win
        } else {
            GameOutcome::Loss
        }
    }

    /// The other participant, or an empty string if there is none.
    pub fn opponent_of(&self, user_id: &str) -> &str {
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Receives terminal outcomes.
pub trait ResultReporter: Send + Sync {
    /// Records one outcome.
    fn record_outcome(&self, report: &OutcomeReport) -> Result<(), ReportError>;
}

/// Reporter failure with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Report error: {} at {}:{}", message, file, line)]
pub struct ReportError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ReportError {
    /// Creates a new report error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<DbError> for ReportError {
    #[track_caller]
    fn from(err: DbError) -> Self {
        Self::new(err.to_string())
    }
}

/// Discards every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ResultReporter for NoopReporter {
    fn record_outcome(&self, report: &OutcomeReport) -> Result<(), ReportError> {
        debug!(match_id = %report.match_id, "Discarding game result");
        Ok(())
    }
}

/// Keeps outcomes in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<OutcomeReport>>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes recorded so far, oldest first.
    pub fn reports(&self) -> Vec<OutcomeReport> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ResultReporter for RecordingReporter {
    fn record_outcome(&self, report: &OutcomeReport) -> Result<(), ReportError> {
        self.reports
            .lock()
            .map_err(|_| ReportError::new("Recording reporter lock poisoned"))?
            .push(report.clone());
        Ok(())
    }
}

/// Enqueues outcomes for a background worker that hands each one to the
/// wrapped reporter on tokio's blocking pool, one at a time and in order.
/// Enqueueing never waits; write failures are logged by the worker.
#[derive(Debug, Clone)]
pub struct QueuedReporter {
    tx: mpsc::UnboundedSender<OutcomeReport>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl QueuedReporter {
    /// Starts the worker. Must be called from within a tokio runtime.
    pub fn spawn(inner: Arc<dyn ResultReporter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutcomeReport>();
        let pending = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let worker_pending = Arc::clone(&pending);
        let worker_drained = Arc::clone(&drained);
        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                let match_id = report.match_id.clone();
                let reporter = Arc::clone(&inner);
                let written =
                    tokio::task::spawn_blocking(move || reporter.record_outcome(&report)).await;
                match written {
                    Ok(Ok(())) => debug!(match_id = %match_id, "Game result written"),
                    Ok(Err(e)) => {
                        error!(match_id = %match_id, error = %e, "Failed to record game result")
                    }
                    Err(e) => {
                        error!(match_id = %match_id, error = %e, "Result writer did not finish")
                    }
                }
                if worker_pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    worker_drained.notify_waiters();
                }
            }
            debug!("Result queue closed");
        });

        Self {
            tx,
            pending,
            drained,
        }
    }

    /// Outcomes enqueued but not yet written.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Waits until every enqueued outcome has been written or has failed.
    pub async fn flush(&self) {
        loop {
            let drained = self.drained.notified();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl ResultReporter for QueuedReporter {
    fn record_outcome(&self, report: &OutcomeReport) -> Result<(), ReportError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(report.clone()).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ReportError::new("Result queue closed"));
        }
        debug!(match_id = %report.match_id, "Game result queued");
        Ok(())
    }
}

/// Writes outcomes to the stats store: per-player counters, leaderboard
/// score and game history.
#[derive(Debug, Clone)]
pub struct SqliteReporter {
    repository: StatsRepository,
}

impl SqliteReporter {
    /// Wraps a repository.
    pub fn new(repository: StatsRepository) -> Self {
        Self { repository }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &StatsRepository {
        &self.repository
    }
}

impl ResultReporter for SqliteReporter {
    /// Records every participant independently; one failing participant
    /// does not stop the others.
    #[instrument(skip(self, report), fields(match_id = %report.match_id, is_draw = report.is_draw))]
    fn record_outcome(&self, report: &OutcomeReport) -> Result<(), ReportError> {
        let mut failures = Vec::new();

        for player in &report.participants {
            let outcome = report.outcome_for(player);
            let opponent = report.opponent_of(player);
            match self
                .repository
                .record_result(player, opponent, outcome, &report.match_id)
            {
                Ok(stats) => {
                    info!(
                        player = %player,
                        outcome = outcome.to_db_string(),
                        score = stats.score(),
                        "Game result stored"
                    );
                }
                Err(e) => {
                    warn!(player = %player, error = %e, "Failed to store game result");
                    failures.push(format!("{}: {}", player, e.message));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReportError::new(failures.join("; ")))
        }
    }
}
