//! Game rules.
//!
//! Pure functions for evaluating a board. Rules are separated from board
//! storage so the match controller can sequence them itself.

pub mod draw;
pub mod win;

pub use draw::is_full;
pub use win::{LINES, WinningLine, check_winner, evaluate_win};

use crate::{Board, Mark, RoundResult};
use tracing::instrument;

/// Evaluates the board right after `last_mover` played.
///
/// Win check first; if no win, a full board is a draw.
#[instrument(skip(board))]
pub fn round_result(board: &Board, last_mover: Mark) -> (RoundResult, Option<WinningLine>) {
    if let Some(line) = evaluate_win(board, last_mover) {
        return (RoundResult::Win(last_mover), Some(line));
    }
    if is_full(board) {
        return (RoundResult::Draw, None);
    }
    (RoundResult::InProgress, None)
}
