//! Round outcome.

use super::Mark;
use serde::{Deserialize, Serialize};

/// State of a round: still running, won by a mark, or drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundResult {
    /// Moves are still being accepted.
    InProgress,
    /// The mark won.
    Win(Mark),
    /// Ended with no winner.
    Draw,
}

impl RoundResult {
    /// Returns the winner if there is one.
    pub fn winner(&self) -> Option<Mark> {
        match self {
            RoundResult::Win(mark) => Some(*mark),
            RoundResult::InProgress | RoundResult::Draw => None,
        }
    }

    /// Returns true if the round ended in a draw.
    pub fn is_draw(&self) -> bool {
        matches!(self, RoundResult::Draw)
    }

    /// Returns true once the round has ended.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundResult::InProgress)
    }
}

impl std::fmt::Display for RoundResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundResult::InProgress => write!(f, "In progress"),
            RoundResult::Win(mark) => write!(f, "{} wins", mark),
            RoundResult::Draw => write!(f, "Draw"),
        }
    }
}
