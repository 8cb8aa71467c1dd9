//! Board invariants.
//!
//! Invariants are logical properties that must hold throughout a round.
//! The match controller checks them in debug builds after every accepted
//! move; tests check them directly.

pub mod monotonic_board;

pub use monotonic_board::MonotonicBoardInvariant;

use crate::{Board, Move};

/// A round as seen by the invariants: the live board plus the accepted
/// moves that produced it.
#[derive(Debug, Clone, Copy)]
pub struct RoundView<'a> {
    /// The live board.
    pub board: &'a Board,
    /// Accepted moves in order.
    pub history: &'a [Move],
}

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("Invariant violated: {}", description)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Checks a single invariant, turning a failure into a violation.
pub fn check<S, I: Invariant<S>>(state: &S) -> Result<(), InvariantViolation> {
    if I::holds(state) {
        Ok(())
    } else {
        Err(InvariantViolation::new(I::description()))
    }
}
