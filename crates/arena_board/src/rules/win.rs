//! Win detection.

use crate::{Board, Mark, Position, Square};
use tracing::instrument;

/// A completed line of three positions.
pub type WinningLine = [Position; 3];

/// The 8 lines in evaluation order: rows, then columns, then diagonals.
pub const LINES: [WinningLine; 8] = [
    // Rows
    [Position::TopLeft, Position::TopCenter, Position::TopRight],
    [Position::MiddleLeft, Position::Center, Position::MiddleRight],
    [Position::BottomLeft, Position::BottomCenter, Position::BottomRight],
    // Columns
    [Position::TopLeft, Position::MiddleLeft, Position::BottomLeft],
    [Position::TopCenter, Position::Center, Position::BottomCenter],
    [Position::TopRight, Position::MiddleRight, Position::BottomRight],
    // Diagonals
    [Position::TopLeft, Position::Center, Position::BottomRight],
    [Position::TopRight, Position::Center, Position::BottomLeft],
];

/// Returns the first line fully held by `mark`, if any.
///
/// `Mark::Undefined` never wins.
#[instrument(skip(board))]
pub fn evaluate_win(board: &Board, mark: Mark) -> Option<WinningLine> {
    if !mark.is_defined() {
        return None;
    }
    let held = Square::Occupied(mark);
    LINES
        .into_iter()
        .find(|line| line.iter().all(|pos| board.get(*pos) == held))
}

/// Checks the board for any winner.
#[instrument(skip(board))]
pub fn check_winner(board: &Board) -> Option<(Mark, WinningLine)> {
    [Mark::X, Mark::O]
        .into_iter()
        .find_map(|mark| evaluate_win(board, mark).map(|line| (mark, line)))
}
