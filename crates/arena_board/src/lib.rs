//! Pure tic-tac-toe rules for the arena match engine.
//!
//! - **Types**: [`Mark`], [`Square`], [`Board`], [`Position`], [`Move`]
//! - **Rules**: win/draw evaluation ([`evaluate_win`], [`is_full`],
//!   [`round_result`]) over a 9-cell board
//! - **Outcome**: the three-way [`RoundResult`]
//! - **Invariants**: properties checked against a round's move history
//!
//! Nothing in this crate holds state between calls.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod outcome;
mod position;
mod types;

pub mod invariants;
pub mod rules;

pub use action::{Move, MoveError};
pub use outcome::RoundResult;
pub use position::{InvalidPosition, Position};
pub use rules::{LINES, WinningLine, check_winner, evaluate_win, is_full, round_result};
pub use types::{Board, InvalidMark, Mark, Square};
