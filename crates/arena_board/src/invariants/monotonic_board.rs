//! Monotonic board invariant: squares never change once set.

use super::{Invariant, RoundView};
use crate::{Board, Square};

/// Invariant: board squares are monotonic (never overwritten).
///
/// Replays the move history onto an empty board; every move must land on
/// an empty square and the result must equal the live board.
pub struct MonotonicBoardInvariant;

impl<'a> Invariant<RoundView<'a>> for MonotonicBoardInvariant {
    fn holds(round: &RoundView<'a>) -> bool {
        let mut reconstructed = Board::new();

        for mv in round.history {
            if reconstructed.get(mv.position) != Square::Empty {
                return false;
            }
            reconstructed.set(mv.position, Square::Occupied(mv.mark));
        }

        reconstructed == *round.board
    }

    fn description() -> &'static str {
        "Board squares are monotonic (never overwritten)"
    }
}
