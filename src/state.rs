//! The mutable record owned by one match instance.

use crate::presence::{PresenceTable, UserId};
use arena_board::{Board, Mark, Move, RoundResult, WinningLine};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Discovery metadata published for matchmaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct MatchLabel {
    /// Accepting new players.
    open: bool,
    /// Turn clock enabled.
    timed: bool,
}

impl MatchLabel {
    /// An open label.
    pub fn new(timed: bool) -> Self {
        Self { open: true, timed }
    }

    /// JSON form, e.g. `{"open":true,"timed":false}`.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "open": self.open, "timed": self.timed }).to_string()
    }

    pub(crate) fn set_open(&mut self, open: bool) {
        self.open = open;
    }
}

/// Where a match is in its lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchPhase {
    /// No round has started yet.
    WaitingForPlayers,
    /// A round is in progress.
    Playing,
    /// The last round reached a terminal result.
    RoundOver,
}

/// Match state. Only the lifecycle controller mutates it.
#[derive(Debug, Clone, Getters)]
pub struct MatchState {
    /// Published discovery label.
    pub(crate) label: MatchLabel,
    /// Consecutive ticks with nobody connected or joining.
    pub(crate) empty_ticks: u32,
    /// Consecutive ticks a running round had one participant connected.
    pub(crate) abandoned_ticks: u32,
    /// Connection slots.
    pub(crate) presences: PresenceTable,
    /// `None` until the first round starts.
    pub(crate) board: Option<Board>,
    /// Participants of the current or last round, X first.
    pub(crate) marks: Vec<(UserId, Mark)>,
    /// Whose turn it is.
    pub(crate) mark: Mark,
    /// Ticks left for the current mover.
    pub(crate) deadline_remaining_ticks: i64,
    /// `None` until the first round starts.
    pub(crate) result: Option<RoundResult>,
    /// Line completed by the winning move, if any.
    pub(crate) winner_positions: Option<WinningLine>,
    /// Ticks until an automatic next round; always 0.
    pub(crate) next_game_remaining_ticks: i64,
    /// Accepted moves of the current round.
    pub(crate) history: Vec<Move>,
}

impl MatchState {
    /// State of a freshly created match.
    pub fn new(label: MatchLabel) -> Self {
        Self {
            label,
            empty_ticks: 0,
            abandoned_ticks: 0,
            presences: PresenceTable::new(),
            board: None,
            marks: Vec::new(),
            mark: Mark::Undefined,
            deadline_remaining_ticks: 0,
            result: None,
            winner_positions: None,
            next_game_remaining_ticks: 0,
            history: Vec::new(),
        }
    }

    /// True while a round is in progress.
    pub fn playing(&self) -> bool {
        self.result == Some(RoundResult::InProgress)
    }

    /// Lifecycle phase derived from the round result.
    pub fn phase(&self) -> MatchPhase {
        match self.result {
            None => MatchPhase::WaitingForPlayers,
            Some(RoundResult::InProgress) => MatchPhase::Playing,
            Some(_) => MatchPhase::RoundOver,
        }
    }

    /// Mark a user holds in the current or last round.
    pub fn mark_of(&self, user_id: &str) -> Option<Mark> {
        self.marks
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, mark)| *mark)
    }

    /// User holding a mark, by reverse lookup.
    pub fn user_of_mark(&self, mark: Mark) -> Option<&UserId> {
        self.marks
            .iter()
            .find(|(_, m)| *m == mark)
            .map(|(id, _)| id)
    }

    /// Participant ids in mark order.
    pub fn participants(&self) -> Vec<UserId> {
        self.marks.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Clears everything belonging to the last round.
    pub(crate) fn clear_round(&mut self) {
        self.board = None;
        self.marks.clear();
        self.mark = Mark::Undefined;
        self.deadline_remaining_ticks = 0;
        self.result = None;
        self.winner_positions = None;
        self.next_game_remaining_ticks = 0;
        self.history.clear();
        self.abandoned_ticks = 0;
    }
}
